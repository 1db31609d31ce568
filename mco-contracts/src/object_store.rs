use async_trait::async_trait;
use mco_model::{Fragment, MachineConfigPool, NodeObject, RenderedRevision};
use thiserror::Error;

/// Errors surfaced by an `ObjectStore` implementation. `NotFound` is a
/// first-class value per `spec.md` §7, not folded into a generic "transient"
/// bucket, because several call sites (collision detection, revision fetch
/// during reboot decision) branch on it explicitly.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Retriable: network blip, conflict, rate limit.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Not retriable: auth failure, malformed object, schema violation.
    #[error("permanent store error: {0}")]
    Permanent(String),

    /// A patch lost a compare-and-swap race; caller should refetch and retry.
    #[error("conflict updating {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Watch stream event kind, mirroring the three events a reflector-style
/// watch can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

/// Everything the engine needs from the cluster object-store, grouped by
/// kind. A production implementation backs this with a real cluster client;
/// `testing::InMemoryObjectStore` backs it with a `parking_lot`-guarded map
/// for tests and local dry-runs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_fragments(&self) -> StoreResult<Vec<Fragment>>;

    async fn get_pool(&self, name: &str) -> StoreResult<MachineConfigPool>;
    async fn list_pools(&self) -> StoreResult<Vec<MachineConfigPool>>;
    async fn put_pool(&self, pool: &MachineConfigPool) -> StoreResult<()>;

    async fn get_revision(&self, name: &str) -> StoreResult<RenderedRevision>;
    async fn list_revisions_for_pool(&self, pool: &str) -> StoreResult<Vec<RenderedRevision>>;
    /// Create a revision; returns `StoreError::Conflict` if the name already
    /// exists (the Revision Builder is responsible for collision handling,
    /// not this trait).
    async fn create_revision(&self, revision: &RenderedRevision) -> StoreResult<()>;
    async fn delete_revision(&self, name: &str) -> StoreResult<()>;

    async fn get_node(&self, name: &str) -> StoreResult<NodeObject>;
    async fn list_nodes(&self) -> StoreResult<Vec<NodeObject>>;
    /// Apply a JSON merge patch (`mco_model::AnnotationPatch::to_json`) to a
    /// node's annotations, or flip schedulability when `unschedulable` is
    /// `Some`. Always a merge, never a replace.
    async fn patch_node(
        &self,
        name: &str,
        annotations_patch: Option<serde_json::Value>,
        unschedulable: Option<bool>,
    ) -> StoreResult<()>;

    /// Push one watch event for the named node to any current watchers.
    /// Implementations that back a live cluster client ignore this and
    /// instead translate the cluster's own watch stream.
    async fn watch_node(
        &self,
        name: &str,
    ) -> StoreResult<tokio_stream::wrappers::ReceiverStream<WatchEvent<NodeObject>>>;
}
