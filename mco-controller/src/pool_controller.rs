//! C15 — Pool Controller. Orchestrates render (C1-C4), rollout planning
//! (C13), and drain (C14) for one pool per reconcile tick.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use mco_contracts::object_store::ObjectStore;
use mco_contracts::pod_manager::PodManager;
use mco_core::render::{render_pool, RenderError};
use mco_core::revision_builder::BuildOutcome;
use mco_model::condition::set_condition;
use mco_model::node::keys;
use mco_model::{
    AgentState, AnnotationPatch, Condition, ConditionStatus, ConditionType, Fragment,
    MachineConfigPool, NodeObject,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::drain_engine::{self, DrainStatus};
use crate::drain_exclusions::DrainExclusions;
use crate::rollout_planner;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("store: {0}")]
    Store(#[from] mco_contracts::object_store::StoreError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error("drain: {0}")]
    Drain(#[from] crate::drain_engine::DrainError),
}

#[derive(Debug, Clone)]
struct DebounceState {
    revision_name: String,
    first_seen: DateTime<Utc>,
}

/// What happened on one reconcile tick, surfaced for logging/tests — the
/// pool's own `status` annotations are the durable record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub target_published: Option<String>,
    pub started_updating: Vec<String>,
    pub drained_to_completion: Vec<String>,
    pub drain_stuck: Vec<String>,
    pub overlapping_nodes: Vec<String>,
}

pub struct PoolController<'a> {
    store: &'a dyn ObjectStore,
    pods: &'a dyn PodManager,
    exclusions: DrainExclusions,
    self_node_name: String,
    debounce: Mutex<HashMap<String, DebounceState>>,
}

impl<'a> PoolController<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        pods: &'a dyn PodManager,
        exclusions: DrainExclusions,
        self_node_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            pods,
            exclusions,
            self_node_name: self_node_name.into(),
            debounce: Mutex::new(HashMap::new()),
        }
    }

    /// One reconcile tick for `pool_name` (spec.md §4.14 steps 1-6). Step 7
    /// (pairwise overlap) is computed across the whole pool set by
    /// `detect_overlaps`, called once per sweep rather than per pool.
    pub async fn reconcile(&self, pool_name: &str, now: DateTime<Utc>) -> Result<ReconcileSummary, ReconcileError> {
        let mut pool = self.store.get_pool(pool_name).await?;
        let mut summary = ReconcileSummary::default();

        if pool.paused {
            info!(pool = pool_name, "pool paused, skipping rollout this tick");
            self.publish_status(&mut pool).await?;
            return Ok(summary);
        }

        // 1: list + validate + render.
        let fragments = self.matching_fragments(&pool).await?;
        let build = match render_pool(self.store, &pool, &fragments).await {
            Ok(build) => {
                clear_render_degraded(&mut pool, now);
                build
            }
            Err(e) => {
                set_condition(
                    &mut pool.status.conditions,
                    Condition::new(ConditionType::RenderDegraded, ConditionStatus::True, "RenderFailed", e.to_string(), now),
                );
                self.store.put_pool(&pool).await?;
                return Err(e.into());
            }
        };
        if matches!(build.outcome, BuildOutcome::CollisionResolved { .. }) {
            info!(pool = pool_name, name = %build.revision.name, "revision name collision resolved");
        }

        // 2: debounce on rendered-revision-name change.
        let ready = self.debounce_ready(pool_name, &build.revision.name, pool.rollout.debounce_seconds, now);
        if !ready {
            self.store.put_pool(&pool).await?;
            return Ok(summary);
        }

        // 3: write revision (already persisted by render_pool/build_revision
        // when newly created) and set pool target.
        pool.status.target_revision = Some(build.revision.name.clone());
        summary.target_published = Some(build.revision.name.clone());

        // 4: rollout planner + drain engine.
        let nodes = self.matching_nodes(&pool).await?;
        let overlap = self.overlap_exclusions(&pool, &nodes).await?;
        if !overlap.is_empty() {
            summary.overlapping_nodes = overlap.iter().cloned().collect();
        }
        let plan = rollout_planner::plan(&nodes, &build.revision.name, &pool.max_unavailable, &overlap);

        for name in &plan.next_batch {
            self.start_node_update(&build.revision.name, name).await?;
            summary.started_updating.push(name.clone());
        }

        // Drive drain/uncordon for every node still carrying cordon/drain
        // bookkeeping, not just nodes the planner currently classifies as
        // `updating` — a node that converges in one agent tick (cordoned,
        // then done+current==desired before the next reconcile) is
        // classified `updated` by the planner and would otherwise never
        // reach `advance_drain`, leaving it cordoned forever.
        for node in &nodes {
            let typed = node.typed_annotations();
            if typed.cordoned || typed.drain_started_at.is_some() {
                self.advance_drain(&mut pool, &node.name, now, &mut summary).await?;
            }
        }

        // 5: recompute status counts/conditions.
        self.recompute_counts(&mut pool, &nodes, &build.revision.name);

        // 6: retention.
        self.sweep_retention(&pool).await?;

        self.store.put_pool(&pool).await?;
        Ok(summary)
    }

    async fn matching_fragments(&self, pool: &MachineConfigPool) -> Result<Vec<Fragment>, ReconcileError> {
        let all = self.store.list_fragments().await?;
        Ok(all
            .into_iter()
            .filter(|f| {
                pool.machine_config_selector
                    .iter()
                    .all(|(k, v)| f.pool_labels.iter().any(|(fk, fv)| fk == k && fv == v))
            })
            .collect())
    }

    async fn matching_nodes(&self, pool: &MachineConfigPool) -> Result<Vec<NodeObject>, ReconcileError> {
        let all = self.store.list_nodes().await?;
        Ok(all
            .into_iter()
            .filter(|n| n.matches_selector(&pool.node_selector))
            .collect())
    }

    /// Step 7's per-pair overlap check, scoped to nodes also claimed by
    /// another pool whose selector matches them — returns the names to
    /// exclude from *this* pool's rollout candidates.
    async fn overlap_exclusions(
        &self,
        pool: &MachineConfigPool,
        nodes: &[NodeObject],
    ) -> Result<BTreeSet<String>, ReconcileError> {
        let all_pools = self.store.list_pools().await?;
        let mut excluded = BTreeSet::new();
        for other in &all_pools {
            if other.name == pool.name {
                continue;
            }
            for node in nodes {
                if node.matches_selector(&other.node_selector) {
                    excluded.insert(node.name.clone());
                }
            }
        }
        Ok(excluded)
    }

    fn debounce_ready(&self, pool_name: &str, revision_name: &str, debounce_seconds: u32, now: DateTime<Utc>) -> bool {
        let mut debounce = self.debounce.lock();
        match debounce.get(pool_name) {
            Some(state) if state.revision_name == revision_name => {
                (now - state.first_seen).num_seconds() >= i64::from(debounce_seconds)
            }
            _ => {
                debounce.insert(
                    pool_name.to_string(),
                    DebounceState {
                        revision_name: revision_name.to_string(),
                        first_seen: now,
                    },
                );
                debounce_seconds == 0
            }
        }
    }

    /// "Newly discovered" nodes (no MCO annotations at all) skip cordon and
    /// drain entirely, per spec.md §4.12 — they join by being handed a
    /// desired-revision directly.
    async fn start_node_update(&self, target: &str, node_name: &str) -> Result<(), ReconcileError> {
        let node = self.store.get_node(node_name).await?;
        let is_new = node.annotations.is_empty();

        let patch = AnnotationPatch::new().set(keys::desired_revision(), target);
        self.store.patch_node(node_name, Some(patch.to_json()), None).await?;

        if is_new {
            info!(node = node_name, target, "newly discovered node, skipping cordon/drain");
        } else if !drain_engine::is_self(node_name, &self.self_node_name) {
            drain_engine::begin(self.store, &node, Utc::now()).await?;
        } else {
            warn!(node = node_name, "refusing to drain the node hosting this controller");
        }
        Ok(())
    }

    async fn advance_drain(
        &self,
        pool: &mut MachineConfigPool,
        node_name: &str,
        now: DateTime<Utc>,
        summary: &mut ReconcileSummary,
    ) -> Result<(), ReconcileError> {
        if drain_engine::is_self(node_name, &self.self_node_name) {
            return Ok(());
        }
        let node = self.store.get_node(node_name).await?;
        let typed = node.typed_annotations();

        if typed.cordoned {
            let status = drain_engine::step(
                self.store,
                self.pods,
                &self.exclusions,
                &node,
                pool.rollout.drain_timeout_seconds,
                pool.rollout.drain_retry_seconds,
                now,
            )
            .await?;
            match status {
                DrainStatus::Complete => {
                    clear_drain_stuck(pool, now);
                }
                DrainStatus::Stuck { .. } => {
                    set_condition(
                        &mut pool.status.conditions,
                        Condition::new(ConditionType::DrainStuck, ConditionStatus::True, "DrainTimeout", format!("node {node_name} still has pods after the drain timeout"), now),
                    );
                    summary.drain_stuck.push(node_name.to_string());
                }
                DrainStatus::InProgress { .. } => {}
            }
        }

        // Once the agent reports done for this node's desired revision,
        // clear cordon/drain bookkeeping regardless of drain status above —
        // an agent that's finished applying no longer needs the cordon.
        if typed.agent_state == Some(AgentState::Done) && typed.current_revision == typed.desired_revision {
            drain_engine::finish(self.store, node_name).await?;
            summary.drained_to_completion.push(node_name.to_string());
        }
        Ok(())
    }

    fn recompute_counts(&self, pool: &mut MachineConfigPool, nodes: &[NodeObject], target: &str) {
        let mut counts = mco_model::pool::MachineCounts {
            total: nodes.len() as u32,
            ..Default::default()
        };
        let mut degraded = 0u32;
        for node in nodes {
            let typed = node.typed_annotations();
            if typed.current_revision.as_deref() == Some(target) {
                counts.updated += 1;
            }
            if typed.agent_state == Some(AgentState::Applying) {
                counts.updating += 1;
            }
            if typed.agent_state == Some(AgentState::Error) {
                degraded += 1;
            }
            if typed.reboot_pending {
                counts.pending_reboot += 1;
            }
            if typed.cordoned {
                counts.cordoned += 1;
            }
            if typed.cordoned && typed.drain_started_at.is_some() {
                counts.draining += 1;
            }
            if matches!(typed.agent_state, Some(AgentState::Done) | Some(AgentState::Idle)) && !typed.reboot_pending {
                counts.ready += 1;
            }
            if typed.cordoned || !matches!(typed.agent_state, Some(AgentState::Done) | Some(AgentState::Idle) | None) {
                counts.unavailable += 1;
            }
        }
        counts.degraded = degraded;
        pool.status.machine_counts = counts;

        let now = Utc::now();
        let all_updated = counts.total > 0 && counts.updated == counts.total;
        set_condition(
            &mut pool.status.conditions,
            Condition::new(
                ConditionType::Updated,
                if all_updated { ConditionStatus::True } else { ConditionStatus::False },
                "RolloutState",
                format!("{}/{} nodes on target", counts.updated, counts.total),
                now,
            ),
        );
        set_condition(
            &mut pool.status.conditions,
            Condition::new(
                ConditionType::Updating,
                if counts.updating > 0 { ConditionStatus::True } else { ConditionStatus::False },
                "RolloutState",
                format!("{} nodes updating", counts.updating),
                now,
            ),
        );
        set_condition(
            &mut pool.status.conditions,
            Condition::new(
                ConditionType::Degraded,
                if degraded > 0 { ConditionStatus::True } else { ConditionStatus::False },
                "AgentErrors",
                format!("{degraded} nodes reporting agent-state=error"),
                now,
            ),
        );
        if all_updated {
            pool.status.current_revision = Some(target.to_string());
            pool.status.last_successful_revision = Some(target.to_string());
        }
    }

    /// Step 6: keep the first `limit` by creation time, plus anything
    /// referenced by a node's current/desired annotation or the pool's own
    /// target; delete the rest.
    async fn sweep_retention(&self, pool: &MachineConfigPool) -> Result<(), ReconcileError> {
        if pool.revision_history_limit == 0 {
            return Ok(());
        }
        let mut revisions = self.store.list_revisions_for_pool(&pool.name).await?;
        revisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let nodes = self.store.list_nodes().await?;
        let mut in_use: BTreeSet<String> = BTreeSet::new();
        if let Some(target) = &pool.status.target_revision {
            in_use.insert(target.clone());
        }
        for node in &nodes {
            let typed = node.typed_annotations();
            if let Some(r) = typed.current_revision {
                in_use.insert(r);
            }
            if let Some(r) = typed.desired_revision {
                in_use.insert(r);
            }
        }

        for (index, revision) in revisions.iter().enumerate() {
            let keep = index < pool.revision_history_limit as usize || in_use.contains(&revision.name);
            if !keep {
                self.store.delete_revision(&revision.name).await?;
                info!(pool = %pool.name, revision = %revision.name, "retention swept revision");
            }
        }
        Ok(())
    }

    async fn publish_status(&self, pool: &mut MachineConfigPool) -> Result<(), ReconcileError> {
        self.store.put_pool(pool).await?;
        Ok(())
    }
}

fn clear_render_degraded(pool: &mut MachineConfigPool, now: DateTime<Utc>) {
    set_condition(
        &mut pool.status.conditions,
        Condition::new(ConditionType::RenderDegraded, ConditionStatus::False, "RenderSucceeded", "", now),
    );
}

fn clear_drain_stuck(pool: &mut MachineConfigPool, now: DateTime<Utc>) {
    set_condition(
        &mut pool.status.conditions,
        Condition::new(ConditionType::DrainStuck, ConditionStatus::False, "DrainCompleted", "", now),
    );
}

/// Step 7, run once per sweep across every pool pair rather than inside a
/// single pool's reconcile — overlap is symmetric and touches both pools.
pub async fn detect_overlaps(store: &dyn ObjectStore, now: DateTime<Utc>) -> Result<(), ReconcileError> {
    let pools = store.list_pools().await?;
    let nodes = store.list_nodes().await?;

    let mut overlapping: HashMap<String, bool> = pools.iter().map(|p| (p.name.clone(), false)).collect();

    for (i, a) in pools.iter().enumerate() {
        for b in pools.iter().skip(i + 1) {
            let shares_a_node = nodes
                .iter()
                .any(|n| n.matches_selector(&a.node_selector) && n.matches_selector(&b.node_selector));
            if shares_a_node {
                overlapping.insert(a.name.clone(), true);
                overlapping.insert(b.name.clone(), true);
            }
        }
    }

    for mut pool in pools {
        let has_overlap = overlapping.get(&pool.name).copied().unwrap_or(false);
        set_condition(
            &mut pool.status.conditions,
            Condition::new(
                ConditionType::PoolOverlap,
                if has_overlap { ConditionStatus::True } else { ConditionStatus::False },
                "NodeSelectorOverlap",
                if has_overlap { "shares at least one node with another pool" } else { "" },
                now,
            ),
        );
        store.put_pool(&pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_contracts::testing::{InMemoryObjectStore, InMemoryPodManager};
    use mco_model::{FileSpec, MaxUnavailable, RolloutPolicy};

    fn pool_with_selector(name: &str) -> MachineConfigPool {
        let mut pool = MachineConfigPool::new(name);
        pool.machine_config_selector = vec![("pool".to_string(), name.to_string())];
        pool.rollout = RolloutPolicy {
            debounce_seconds: 0,
            ..RolloutPolicy::default()
        };
        pool.max_unavailable = MaxUnavailable::Count(1);
        pool
    }

    #[tokio::test]
    async fn first_reconcile_renders_sets_target_and_starts_a_candidate() {
        let store = InMemoryObjectStore::new();
        let pods = InMemoryPodManager::new();
        let pool = pool_with_selector("workers");
        store.seed_pool(pool.clone());

        let mut fragment = Fragment::new("base", 10);
        fragment.pool_labels.push(("pool".to_string(), "workers".to_string()));
        fragment.files.push(FileSpec::present("/etc/mco-test/e2e-apply.conf", "hello"));
        store.seed_fragment(fragment);

        store.seed_node(NodeObject::new("node-a"));

        let controller = PoolController::new(&store, &pods, DrainExclusions::default(), "controller-self");
        let summary = controller.reconcile("workers", Utc::now()).await.unwrap();

        assert!(summary.target_published.is_some());
        assert_eq!(summary.started_updating, vec!["node-a".to_string()]);

        let updated_pool = store.get_pool("workers").await.unwrap();
        assert_eq!(updated_pool.status.target_revision, summary.target_published);
    }

    #[tokio::test]
    async fn retention_keeps_in_use_revisions_beyond_the_limit() {
        let store = InMemoryObjectStore::new();
        let pods = InMemoryPodManager::new();
        let mut pool = pool_with_selector("workers");
        pool.revision_history_limit = 1;
        store.seed_pool(pool.clone());

        for i in 0..3 {
            let mut fragment = Fragment::new("base", 10);
            fragment.pool_labels.push(("pool".to_string(), "workers".to_string()));
            fragment.files.push(FileSpec::present("/etc/mco-test/x", format!("v{i}")));
            store.remove_fragment("base");
            store.seed_fragment(fragment);

            let controller = PoolController::new(&store, &pods, DrainExclusions::default(), "controller-self");
            controller.reconcile("workers", Utc::now()).await.unwrap();
        }

        let revisions = store.list_revisions_for_pool("workers").await.unwrap();
        assert!(revisions.len() <= 2, "expected retention to bound history near the limit, got {}", revisions.len());
    }

    #[tokio::test]
    async fn overlapping_pools_are_flagged_and_shared_node_excluded() {
        let store = InMemoryObjectStore::new();
        let mut a = MachineConfigPool::new("a");
        a.node_selector = vec![("tier".to_string(), "edge".to_string())];
        let mut b = MachineConfigPool::new("b");
        b.node_selector = vec![("tier".to_string(), "edge".to_string())];
        store.seed_pool(a);
        store.seed_pool(b);

        let mut node = NodeObject::new("shared");
        node.labels.insert("tier".to_string(), "edge".to_string());
        store.seed_node(node);

        detect_overlaps(&store, Utc::now()).await.unwrap();

        let a = store.get_pool("a").await.unwrap();
        let overlap = a.status.conditions.iter().find(|c| c.type_ == ConditionType::PoolOverlap).unwrap();
        assert!(overlap.is_true());
    }
}
