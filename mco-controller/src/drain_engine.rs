//! C14 — Drain Engine. Cordons a node, evicts eligible pods with retry,
//! and surfaces `DrainStuck` once `drain-timeout-seconds` is exceeded.

use chrono::{DateTime, Utc};
use mco_contracts::object_store::ObjectStore;
use mco_contracts::pod_manager::{PodManager, PodManagerError};
use mco_model::node::keys;
use mco_model::{AnnotationPatch, NodeObject};
use thiserror::Error;
use tracing::{info, warn};

use crate::drain_exclusions::DrainExclusions;

#[derive(Error, Debug)]
pub enum DrainError {
    #[error("store: {0}")]
    Store(#[from] mco_contracts::object_store::StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every eligible pod is gone.
    Complete,
    /// At least one eligible pod remains; not yet past the timeout.
    InProgress { remaining: usize },
    /// Past `drain-timeout-seconds` with pods still remaining.
    Stuck { remaining: usize },
}

/// Mark a node cordoned and record the drain start time, unless it already
/// carries one (idempotent — a controller restart mid-drain must not reset
/// the clock used for the stuck-timeout).
pub async fn begin(store: &dyn ObjectStore, node: &NodeObject, now: DateTime<Utc>) -> Result<(), DrainError> {
    if node.typed_annotations().drain_started_at.is_some() {
        return Ok(());
    }
    let patch = AnnotationPatch::new()
        .set(keys::cordoned(), "true")
        .set(keys::drain_started_at(), now.to_rfc3339());
    store.patch_node(&node.name, Some(patch.to_json()), Some(true)).await?;
    info!(node = %node.name, "cordoned node and started drain");
    Ok(())
}

/// Self-exemption: the controller never evicts the pod it runs in, and
/// this node's own drain is skipped entirely when it would drain itself —
/// the controller keeps reconciling from a cordoned host.
pub fn is_self(node_name: &str, self_node_name: &str) -> bool {
    node_name == self_node_name
}

/// One drain attempt tick: list pods, filter exclusions, evict the rest on
/// the `drain-retry-seconds` cadence, and classify progress against the
/// timeout. Eviction attempts are paced off `drain-started-at` and
/// `drain-retry-count` rather than a separate last-attempt timestamp, since
/// those are the only two annotations the node carries for this (`spec.md`
/// §3) — attempt number `n` is due once `elapsed >= (n-1) * drain-retry-seconds`.
pub async fn step(
    store: &dyn ObjectStore,
    pods: &dyn PodManager,
    exclusions: &DrainExclusions,
    node: &NodeObject,
    drain_timeout_seconds: u32,
    drain_retry_seconds: u32,
    now: DateTime<Utc>,
) -> Result<DrainStatus, DrainError> {
    let all_pods = pods.list_pods_on_node(&node.name).await.map_err(pod_manager_err)?;
    let eligible: Vec<_> = all_pods.into_iter().filter(|p| !exclusions.is_excluded(p)).collect();
    let remaining = eligible.len();

    if eligible.is_empty() {
        return Ok(DrainStatus::Complete);
    }

    let typed = node.typed_annotations();
    let started = typed.drain_started_at.unwrap_or(now);
    let elapsed = (now - started).num_seconds().max(0);
    let retry_count = typed.drain_retry_count.unwrap_or(0);
    let retry_interval = i64::from(drain_retry_seconds.max(1));
    let due_attempts = 1 + elapsed / retry_interval;

    if due_attempts <= i64::from(retry_count) {
        return Ok(classify(elapsed, drain_timeout_seconds, remaining));
    }

    let force = retry_count >= exclusions.defaults.max_eviction_attempts;
    for pod in &eligible {
        let outcome = if force {
            pods.force_delete_pod(&pod.namespace, &pod.name).await
        } else {
            pods.evict_pod(&pod.namespace, &pod.name).await
        };
        match outcome {
            Ok(()) => info!(node = %node.name, namespace = %pod.namespace, pod = %pod.name, forced = force, "evicted"),
            Err(PodManagerError::Blocked { reason, .. }) => {
                warn!(node = %node.name, namespace = %pod.namespace, pod = %pod.name, reason, "eviction blocked, will retry");
            }
            Err(e) => return Err(pod_manager_err(e)),
        }
    }

    let patch = AnnotationPatch::new().set(keys::drain_retry_count(), (retry_count + 1).to_string());
    store.patch_node(&node.name, Some(patch.to_json()), None).await?;

    Ok(classify(elapsed, drain_timeout_seconds, remaining))
}

fn classify(elapsed: i64, drain_timeout_seconds: u32, remaining: usize) -> DrainStatus {
    if elapsed >= i64::from(drain_timeout_seconds) {
        DrainStatus::Stuck { remaining }
    } else {
        DrainStatus::InProgress { remaining }
    }
}

/// Uncordon and clear drain bookkeeping once the agent has reported the
/// rollout complete on this node.
pub async fn finish(store: &dyn ObjectStore, node_name: &str) -> Result<(), DrainError> {
    let patch = AnnotationPatch::new()
        .clear(keys::cordoned())
        .clear(keys::drain_started_at())
        .clear(keys::drain_retry_count());
    store.patch_node(node_name, Some(patch.to_json()), Some(false)).await?;
    info!(node = node_name, "uncordoned node, drain bookkeeping cleared");
    Ok(())
}

fn pod_manager_err(e: PodManagerError) -> DrainError {
    // PodManagerError never maps onto StoreError; callers only need the
    // message, so fold it into a generic store-shaped error via Display.
    DrainError::Store(mco_contracts::object_store::StoreError::Transient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_contracts::testing::{InMemoryObjectStore, InMemoryPodManager};
    use mco_model::Pod;

    #[tokio::test]
    async fn begin_is_idempotent_and_sets_cordon_fields() {
        let store = InMemoryObjectStore::new();
        store.seed_node(NodeObject::new("node-1"));
        let now = Utc::now();

        let node = store.get_node("node-1").await.unwrap();
        begin(&store, &node, now).await.unwrap();
        let node = store.get_node("node-1").await.unwrap();
        let typed = node.typed_annotations();
        assert!(typed.cordoned);
        assert!(typed.drain_started_at.is_some());
        assert!(node.unschedulable);

        // Second call must not move the recorded start time.
        begin(&store, &node, now + chrono::Duration::seconds(60)).await.unwrap();
        let node_again = store.get_node("node-1").await.unwrap();
        assert_eq!(
            node_again.typed_annotations().drain_started_at,
            typed.drain_started_at
        );
    }

    #[tokio::test]
    async fn excluded_pods_never_evicted_and_complete_when_none_eligible() {
        let pods = InMemoryPodManager::new();
        let mut daemon = Pod::new("kube-system", "cni-agent");
        daemon.daemon_owned = true;
        pods.seed_pod("node-1", daemon);
        let exclusions = DrainExclusions::default();
        let node = NodeObject::new("node-1");
        let store = InMemoryObjectStore::new();

        let status = step(&store, &pods, &exclusions, &node, 600, 30, Utc::now()).await.unwrap();
        assert_eq!(status, DrainStatus::Complete);
        assert!(pods.evicted.lock().is_empty());
    }

    #[tokio::test]
    async fn blocked_eviction_reports_in_progress_until_timeout_elapses() {
        let pods = InMemoryPodManager::new();
        pods.seed_pod("node-1", Pod::new("default", "checkout-0"));
        pods.block_evictions("default", "checkout-0", 100);
        let exclusions = DrainExclusions::default();

        let mut node = NodeObject::new("node-1");
        let started = Utc::now() - chrono::Duration::seconds(30);
        node.annotations.insert(keys::drain_started_at(), started.to_rfc3339());
        node.annotations.insert(keys::cordoned(), "true".to_string());
        let store = InMemoryObjectStore::new();
        store.seed_node(node.clone());

        let status = step(&store, &pods, &exclusions, &node, 600, 30, Utc::now()).await.unwrap();
        assert_eq!(status, DrainStatus::InProgress { remaining: 1 });

        let status = step(&store, &pods, &exclusions, &node, 10, 30, Utc::now()).await.unwrap();
        assert_eq!(status, DrainStatus::Stuck { remaining: 1 });
    }

    #[tokio::test]
    async fn finish_clears_cordon_and_drain_annotations() {
        let store = InMemoryObjectStore::new();
        let mut node = NodeObject::new("node-1");
        node.annotations.insert(keys::cordoned(), "true".to_string());
        node.annotations.insert(keys::drain_started_at(), Utc::now().to_rfc3339());
        node.unschedulable = true;
        store.seed_node(node);

        finish(&store, "node-1").await.unwrap();
        let node = store.get_node("node-1").await.unwrap();
        let typed = node.typed_annotations();
        assert!(!typed.cordoned);
        assert!(typed.drain_started_at.is_none());
        assert!(!node.unschedulable);
    }
}
