use async_trait::async_trait;
use mco_model::AgentState;

use crate::object_store::StoreResult;

/// Convenience combinators over the raw annotation patch, matching the
/// interface `spec.md` §9 lists for the node-annotation-writer capability.
/// A default blanket impl is provided for any `ObjectStore` in
/// `mco-agent::annotator` / `mco-controller`, layering retry-on-conflict
/// over `ObjectStore::patch_node`.
#[async_trait]
pub trait NodeAnnotationWriter: Send + Sync {
    async fn set_state(&self, node: &str, state: AgentState) -> StoreResult<()>;
    async fn set_current_revision(&self, node: &str, revision: &str) -> StoreResult<()>;
    async fn set_reboot_pending(&self, node: &str, pending: bool) -> StoreResult<()>;
    async fn clear_force_reboot(&self, node: &str) -> StoreResult<()>;
    async fn clear_last_error(&self, node: &str) -> StoreResult<()>;
    async fn set_state_with_error(&self, node: &str, message: &str) -> StoreResult<()>;
    async fn set_done(&self, node: &str, revision: &str) -> StoreResult<()>;
}
