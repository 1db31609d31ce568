//! In-memory / no-op implementations of the capability traits.
//!
//! These back unit and scenario tests across the workspace, and also back
//! the agent's `--skip-systemd` / `--no-reboot` flags and the controller's
//! local dry-run mode — there is no live cluster in this repository.

use std::collections::HashMap;

use async_trait::async_trait;
use mco_model::{Fragment, MachineConfigPool, NodeObject, Pod, RenderedRevision};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::object_store::{ObjectStore, StoreError, StoreResult, WatchEvent};
use crate::pod_manager::{PodManager, PodManagerError};
use crate::reboot::{RebootExecError, RebootExecutor};
use crate::service_manager::{ActiveState, ServiceManager, ServiceManagerError, UnitFileState};

/// An in-process stand-in for the cluster object-store. Single-process,
/// single-node-watch-at-a-time per node name (fan-out to multiple watchers
/// of the same node is supported; each gets its own channel).
#[derive(Default)]
pub struct InMemoryObjectStore {
    fragments: Mutex<HashMap<String, Fragment>>,
    pools: Mutex<HashMap<String, MachineConfigPool>>,
    revisions: Mutex<HashMap<String, RenderedRevision>>,
    nodes: Mutex<HashMap<String, NodeObject>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::Sender<WatchEvent<NodeObject>>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_fragment(&self, fragment: Fragment) {
        self.fragments.lock().insert(fragment.name.clone(), fragment);
    }

    pub fn remove_fragment(&self, name: &str) {
        self.fragments.lock().remove(name);
    }

    pub fn seed_pool(&self, pool: MachineConfigPool) {
        self.pools.lock().insert(pool.name.clone(), pool);
    }

    pub fn seed_revision(&self, revision: RenderedRevision) {
        self.revisions.lock().insert(revision.name.clone(), revision);
    }

    pub fn seed_node(&self, node: NodeObject) {
        self.nodes.lock().insert(node.name.clone(), node);
    }

    fn notify(&self, name: &str, event: WatchEvent<NodeObject>) {
        let mut watchers = self.watchers.lock();
        if let Some(senders) = watchers.get_mut(name) {
            senders.retain(|tx| tx.try_send(event.clone()).is_ok());
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_fragments(&self) -> StoreResult<Vec<Fragment>> {
        let mut out: Vec<_> = self.fragments.lock().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn get_pool(&self, name: &str) -> StoreResult<MachineConfigPool> {
        self.pools
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("pool {name}")))
    }

    async fn list_pools(&self) -> StoreResult<Vec<MachineConfigPool>> {
        let mut out: Vec<_> = self.pools.lock().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn put_pool(&self, pool: &MachineConfigPool) -> StoreResult<()> {
        self.pools.lock().insert(pool.name.clone(), pool.clone());
        Ok(())
    }

    async fn get_revision(&self, name: &str) -> StoreResult<RenderedRevision> {
        self.revisions
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("revision {name}")))
    }

    async fn list_revisions_for_pool(&self, pool: &str) -> StoreResult<Vec<RenderedRevision>> {
        let mut out: Vec<_> = self
            .revisions
            .lock()
            .values()
            .filter(|r| r.pool == pool)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn create_revision(&self, revision: &RenderedRevision) -> StoreResult<()> {
        let mut revisions = self.revisions.lock();
        if revisions.contains_key(&revision.name) {
            return Err(StoreError::Conflict(revision.name.clone()));
        }
        revisions.insert(revision.name.clone(), revision.clone());
        Ok(())
    }

    async fn delete_revision(&self, name: &str) -> StoreResult<()> {
        self.revisions.lock().remove(name);
        Ok(())
    }

    async fn get_node(&self, name: &str) -> StoreResult<NodeObject> {
        self.nodes
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("node {name}")))
    }

    async fn list_nodes(&self) -> StoreResult<Vec<NodeObject>> {
        let mut out: Vec<_> = self.nodes.lock().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn patch_node(
        &self,
        name: &str,
        annotations_patch: Option<serde_json::Value>,
        unschedulable: Option<bool>,
    ) -> StoreResult<()> {
        let updated = {
            let mut nodes = self.nodes.lock();
            let node = nodes
                .get_mut(name)
                .ok_or_else(|| StoreError::NotFound(format!("node {name}")))?;
            if let Some(patch) = annotations_patch {
                if let Some(anns) = patch
                    .get("metadata")
                    .and_then(|m| m.get("annotations"))
                    .and_then(|a| a.as_object())
                {
                    for (k, v) in anns {
                        if v.is_null() {
                            node.annotations.remove(k);
                        } else if let Some(s) = v.as_str() {
                            node.annotations.insert(k.clone(), s.to_string());
                        }
                    }
                }
            }
            if let Some(unsched) = unschedulable {
                node.unschedulable = unsched;
            }
            node.clone()
        };
        self.notify(name, WatchEvent::Modified(updated));
        Ok(())
    }

    async fn watch_node(
        &self,
        name: &str,
    ) -> StoreResult<ReceiverStream<WatchEvent<NodeObject>>> {
        let (tx, rx) = mpsc::channel(32);
        if let Some(node) = self.nodes.lock().get(name).cloned() {
            let _ = tx.try_send(WatchEvent::Added(node));
        }
        self.watchers
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(tx);
        Ok(ReceiverStream::new(rx))
    }
}

/// Records every call for assertions, and tracks enough unit-file/active
/// state to exercise the idempotence rules in `mco-agent::apply::unit`.
#[derive(Default)]
pub struct FakeServiceManager {
    pub calls: Mutex<Vec<(&'static str, String)>>,
    file_state: Mutex<HashMap<String, UnitFileState>>,
    active_state: Mutex<HashMap<String, ActiveState>>,
}

impl FakeServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_file_state(&self, unit: &str, state: UnitFileState) {
        self.file_state.lock().insert(unit.to_string(), state);
    }

    pub fn seed_active_state(&self, unit: &str, state: ActiveState) {
        self.active_state.lock().insert(unit.to_string(), state);
    }

    pub fn call_count(&self, phase: &str, unit: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(p, u)| *p == phase && u == unit)
            .count()
    }

    fn record(&self, phase: &'static str, unit: &str) {
        self.calls.lock().push((phase, unit.to_string()));
    }
}

type SmResult<T> = std::result::Result<T, ServiceManagerError>;

#[async_trait]
impl ServiceManager for FakeServiceManager {
    async fn get_unit_file_state(&self, unit: &str) -> SmResult<UnitFileState> {
        Ok(self
            .file_state
            .lock()
            .get(unit)
            .copied()
            .unwrap_or(UnitFileState::Other))
    }

    async fn get_active_state(&self, unit: &str) -> SmResult<ActiveState> {
        Ok(self
            .active_state
            .lock()
            .get(unit)
            .copied()
            .unwrap_or(ActiveState::Other))
    }

    async fn mask(&self, unit: &str) -> SmResult<()> {
        self.record("mask", unit);
        self.file_state
            .lock()
            .insert(unit.to_string(), UnitFileState::Masked);
        Ok(())
    }

    async fn unmask(&self, unit: &str) -> SmResult<()> {
        self.record("unmask", unit);
        self.file_state.lock().remove(unit);
        Ok(())
    }

    async fn enable(&self, unit: &str) -> SmResult<()> {
        self.record("enable", unit);
        self.file_state
            .lock()
            .insert(unit.to_string(), UnitFileState::Enabled);
        Ok(())
    }

    async fn disable(&self, unit: &str) -> SmResult<()> {
        self.record("disable", unit);
        self.file_state
            .lock()
            .insert(unit.to_string(), UnitFileState::Disabled);
        Ok(())
    }

    async fn start(&self, unit: &str) -> SmResult<()> {
        self.record("start", unit);
        self.active_state
            .lock()
            .insert(unit.to_string(), ActiveState::Active);
        Ok(())
    }

    async fn stop(&self, unit: &str) -> SmResult<()> {
        self.record("stop", unit);
        self.active_state
            .lock()
            .insert(unit.to_string(), ActiveState::Inactive);
        Ok(())
    }

    async fn restart(&self, unit: &str) -> SmResult<()> {
        self.record("restart", unit);
        self.active_state
            .lock()
            .insert(unit.to_string(), ActiveState::Active);
        Ok(())
    }

    async fn reload(&self, unit: &str) -> SmResult<()> {
        self.record("reload", unit);
        Ok(())
    }

    async fn close(&self) -> SmResult<()> {
        Ok(())
    }
}

/// Backs `--skip-systemd`: every verb is a trivial success with no state
/// tracking, for environments without a real service manager.
#[derive(Default)]
pub struct NoopServiceManager;

#[async_trait]
impl ServiceManager for NoopServiceManager {
    async fn get_unit_file_state(&self, _unit: &str) -> SmResult<UnitFileState> {
        Ok(UnitFileState::Other)
    }

    async fn get_active_state(&self, _unit: &str) -> SmResult<ActiveState> {
        Ok(ActiveState::Other)
    }

    async fn mask(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn unmask(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn enable(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn disable(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn start(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn stop(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn restart(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn reload(&self, _unit: &str) -> SmResult<()> {
        Ok(())
    }

    async fn close(&self) -> SmResult<()> {
        Ok(())
    }
}

/// Backs `--no-reboot`, and any test that wants reboot decisions exercised
/// without actually rebooting the test process's host.
#[derive(Default)]
pub struct NoopRebootExecutor {
    pub invocations: Mutex<u32>,
}

#[async_trait]
impl RebootExecutor for NoopRebootExecutor {
    async fn execute(&self) -> std::result::Result<(), RebootExecError> {
        *self.invocations.lock() += 1;
        Ok(())
    }
}

/// Seeded per-node pod list with an optional "refuse the next N evictions"
/// knob per pod, for exercising the Drain Engine's retry/stuck paths.
#[derive(Default)]
pub struct InMemoryPodManager {
    pods: Mutex<HashMap<String, Vec<Pod>>>,
    block_attempts: Mutex<HashMap<(String, String), u32>>,
    pub evicted: Mutex<Vec<(String, String)>>,
}

impl InMemoryPodManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_pod(&self, node: &str, pod: Pod) {
        self.pods.lock().entry(node.to_string()).or_default().push(pod);
    }

    /// The next `attempts` calls to `evict_pod` for this pod return
    /// `Blocked`; after that they succeed.
    pub fn block_evictions(&self, namespace: &str, name: &str, attempts: u32) {
        self.block_attempts
            .lock()
            .insert((namespace.to_string(), name.to_string()), attempts);
    }

    fn remove(&self, namespace: &str, name: &str) {
        for pods in self.pods.lock().values_mut() {
            pods.retain(|p| !(p.namespace == namespace && p.name == name));
        }
    }
}

#[async_trait]
impl PodManager for InMemoryPodManager {
    async fn list_pods_on_node(&self, node: &str) -> std::result::Result<Vec<Pod>, PodManagerError> {
        Ok(self.pods.lock().get(node).cloned().unwrap_or_default())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> std::result::Result<(), PodManagerError> {
        let key = (namespace.to_string(), name.to_string());
        let mut blocks = self.block_attempts.lock();
        if let Some(remaining) = blocks.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PodManagerError::Blocked {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    reason: "eviction policy blocked".to_string(),
                });
            }
        }
        drop(blocks);
        self.remove(namespace, name);
        self.evicted.lock().push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    /// Bypasses the block-attempt counter entirely — a forced delete never
    /// reports `Blocked`, matching a platform delete call that skips
    /// disruption-policy admission.
    async fn force_delete_pod(&self, namespace: &str, name: &str) -> std::result::Result<(), PodManagerError> {
        self.block_attempts.lock().remove(&(namespace.to_string(), name.to_string()));
        self.remove(namespace, name);
        self.evicted.lock().push((namespace.to_string(), name.to_string()));
        Ok(())
    }
}
