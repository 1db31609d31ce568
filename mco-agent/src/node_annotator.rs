//! C11 — Node Annotator. Implements `NodeAnnotationWriter` over any
//! `ObjectStore`, translating each high-level verb into the JSON merge
//! patch body `AnnotationPatch` builds, with retry-on-conflict per
//! `spec.md` §4.10.

use std::time::Duration;

use async_trait::async_trait;
use mco_contracts::object_store::{ObjectStore, StoreError, StoreResult};
use mco_contracts::NodeAnnotationWriter;
use mco_model::node::keys;
use mco_model::{AgentState, AnnotationPatch};
use tracing::warn;

const MAX_RETRIES: u32 = 5;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub struct ObjectStoreAnnotator<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectStoreAnnotator<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    async fn patch_with_retry(&self, node: &str, patch: AnnotationPatch) -> StoreResult<()> {
        let body = patch.to_json();
        let mut attempt = 0;
        loop {
            match self.store.patch_node(node, Some(body.clone()), None).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(_)) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(node, attempt, "annotation patch conflict, retrying");
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[async_trait]
impl<'a> NodeAnnotationWriter for ObjectStoreAnnotator<'a> {
    async fn set_state(&self, node: &str, state: AgentState) -> StoreResult<()> {
        let patch = AnnotationPatch::new().set(keys::agent_state(), state.as_str());
        self.patch_with_retry(node, patch).await
    }

    async fn set_current_revision(&self, node: &str, revision: &str) -> StoreResult<()> {
        let patch = AnnotationPatch::new().set(keys::current_revision(), revision);
        self.patch_with_retry(node, patch).await
    }

    async fn set_reboot_pending(&self, node: &str, pending: bool) -> StoreResult<()> {
        let patch = if pending {
            AnnotationPatch::new().set(keys::reboot_pending(), "true")
        } else {
            AnnotationPatch::new().clear(keys::reboot_pending())
        };
        self.patch_with_retry(node, patch).await
    }

    async fn clear_force_reboot(&self, node: &str) -> StoreResult<()> {
        let patch = AnnotationPatch::new().clear(keys::force_reboot());
        self.patch_with_retry(node, patch).await
    }

    async fn clear_last_error(&self, node: &str) -> StoreResult<()> {
        let patch = AnnotationPatch::new().clear(keys::last_error());
        self.patch_with_retry(node, patch).await
    }

    async fn set_state_with_error(&self, node: &str, message: &str) -> StoreResult<()> {
        let patch = AnnotationPatch::new()
            .set(keys::agent_state(), AgentState::Error.as_str())
            .set(keys::last_error(), message);
        self.patch_with_retry(node, patch).await
    }

    async fn set_done(&self, node: &str, revision: &str) -> StoreResult<()> {
        let patch = AnnotationPatch::new()
            .set(keys::agent_state(), AgentState::Done.as_str())
            .set(keys::current_revision(), revision)
            .clear(keys::last_error())
            .clear(keys::reboot_pending());
        self.patch_with_retry(node, patch).await
    }
}
