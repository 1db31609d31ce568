use async_trait::async_trait;
use mco_model::Pod;
use thiserror::Error;

/// Errors from the platform's pod-eviction primitive. `Blocked` is a
/// first-class value (a PodDisruptionBudget-equivalent refusal), distinct
/// from a transient I/O failure, so the Drain Engine can keep retrying it
/// on the normal `drain-retry-seconds` cadence rather than escalating.
#[derive(Error, Debug, Clone)]
pub enum PodManagerError {
    #[error("eviction of {namespace}/{name} blocked: {reason}")]
    Blocked {
        namespace: String,
        name: String,
        reason: String,
    },
    #[error("pod manager error: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, PodManagerError>;

/// The subset of the platform's pod/eviction API the Drain Engine consumes,
/// standing in for the "platform's eviction primitive" `spec.md` §4.13
/// describes without naming a concrete client.
#[async_trait]
pub trait PodManager: Send + Sync {
    async fn list_pods_on_node(&self, node: &str) -> Result<Vec<Pod>>;

    /// Request voluntary termination. `Err(Blocked)` means a disruption
    /// policy refused the request this attempt; callers retry later.
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Remove the pod outright, bypassing any disruption policy. The Drain
    /// Engine only calls this once `max-eviction-attempts` voluntary
    /// attempts have been exhausted. Defaults to a voluntary eviction for
    /// implementations that never need to distinguish the two.
    async fn force_delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.evict_pod(namespace, name).await
    }
}
