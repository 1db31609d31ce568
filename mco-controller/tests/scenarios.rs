//! End-to-end scenarios against the pool controller, driven purely through
//! `InMemoryObjectStore`/`InMemoryPodManager` — there is no live cluster in
//! this repository.

use chrono::Utc;
use mco_contracts::object_store::ObjectStore;
use mco_contracts::testing::{InMemoryObjectStore, InMemoryPodManager};
use mco_controller::drain_exclusions::DrainExclusions;
use mco_controller::pool_controller::PoolController;
use mco_model::node::keys;
use mco_model::{ConditionType, FileSpec, Fragment, MachineConfigPool, MaxUnavailable, NodeObject, Pod, RolloutPolicy};

fn pool(name: &str) -> MachineConfigPool {
    let mut pool = MachineConfigPool::new(name);
    pool.machine_config_selector = vec![("pool".to_string(), name.to_string())];
    pool.rollout = RolloutPolicy {
        debounce_seconds: 0,
        drain_timeout_seconds: 300,
        ..RolloutPolicy::default()
    };
    pool.max_unavailable = MaxUnavailable::Count(1);
    pool
}

fn fragment_writing(content: &str) -> Fragment {
    let mut fragment = Fragment::new("base", 10);
    fragment.pool_labels.push(("pool".to_string(), "workers".to_string()));
    fragment.files.push(FileSpec::present("/etc/mco-test/e2e-apply.conf", content));
    fragment
}

#[tokio::test]
async fn s4_paused_pool_never_cordons_and_completes_once_unpaused() {
    let store = InMemoryObjectStore::new();
    let pods = InMemoryPodManager::new();
    let mut p = pool("workers");
    p.paused = true;
    store.seed_pool(p);
    store.seed_fragment(fragment_writing("hello"));
    store.seed_node(NodeObject::new("node-a"));

    let controller = PoolController::new(&store, &pods, DrainExclusions::default(), "controller-self");

    for _ in 0..3 {
        let summary = controller.reconcile("workers", Utc::now()).await.unwrap();
        assert!(summary.target_published.is_none(), "a paused pool must never publish a target");
        assert!(summary.started_updating.is_empty());
    }

    let mut unpaused = store.get_pool("workers").await.unwrap();
    unpaused.paused = false;
    store.seed_pool(unpaused);

    let summary = controller.reconcile("workers", Utc::now()).await.unwrap();
    assert!(summary.target_published.is_some());
    assert_eq!(summary.started_updating, vec!["node-a".to_string()]);
}

#[tokio::test]
async fn s5_drain_blocked_reports_stuck_then_clears_once_pods_are_gone() {
    let store = InMemoryObjectStore::new();
    let pods = InMemoryPodManager::new();
    let mut p = pool("workers");
    p.rollout.drain_timeout_seconds = 60;
    store.seed_pool(p);
    store.seed_fragment(fragment_writing("hello"));

    let mut existing = NodeObject::new("node-a");
    existing.annotations.insert(keys::current_revision(), "workers-stale".to_string());
    existing.annotations.insert(keys::agent_state(), "done".to_string());
    store.seed_node(existing);

    pods.seed_pod("node-a", Pod::new("default", "checkout-0"));
    pods.block_evictions("default", "checkout-0", 1);

    let controller = PoolController::new(&store, &pods, DrainExclusions::default(), "controller-self");
    let first_tick = Utc::now();
    controller.reconcile("workers", first_tick).await.unwrap();

    // Past the timeout with the pod still unevictable: DrainStuck goes true.
    let stuck_tick = first_tick + chrono::Duration::seconds(120);
    controller.reconcile("workers", stuck_tick).await.unwrap();
    let p = store.get_pool("workers").await.unwrap();
    let drain_stuck = p.status.conditions.iter().find(|c| c.type_ == ConditionType::DrainStuck).unwrap();
    assert!(drain_stuck.is_true());

    // The eviction succeeds this tick, but the step that observed it still
    // reports against the pod list it started with.
    pods.block_evictions("default", "checkout-0", 0);
    let evict_tick = stuck_tick + chrono::Duration::seconds(5);
    controller.reconcile("workers", evict_tick).await.unwrap();

    // Next tick sees no pods left on the node and reports Complete.
    let cleared_tick = evict_tick + chrono::Duration::seconds(5);
    controller.reconcile("workers", cleared_tick).await.unwrap();
    let p = store.get_pool("workers").await.unwrap();
    let drain_stuck = p.status.conditions.iter().find(|c| c.type_ == ConditionType::DrainStuck).unwrap();
    assert!(!drain_stuck.is_true());
}

#[tokio::test]
async fn s7_debounce_holds_target_until_the_window_elapses() {
    let store = InMemoryObjectStore::new();
    let pods = InMemoryPodManager::new();
    let mut p = pool("workers");
    p.rollout.debounce_seconds = 3;
    store.seed_pool(p);
    store.seed_node(NodeObject::new("node-a"));

    let controller = PoolController::new(&store, &pods, DrainExclusions::default(), "controller-self");
    let t0 = Utc::now();

    store.seed_fragment(fragment_writing("v1"));
    let summary = controller.reconcile("workers", t0).await.unwrap();
    assert!(summary.target_published.is_none(), "debounce must hold the first edit");

    store.remove_fragment("base");
    store.seed_fragment(fragment_writing("v2"));
    let summary = controller.reconcile("workers", t0 + chrono::Duration::seconds(1)).await.unwrap();
    assert!(summary.target_published.is_none(), "a second edit inside the window resets the clock");

    let summary = controller.reconcile("workers", t0 + chrono::Duration::seconds(5)).await.unwrap();
    assert!(summary.target_published.is_some(), "once the window elapses without further change, the target publishes");
}
