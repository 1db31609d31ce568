use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RebootExecError {
    #[error("reboot execution failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, RebootExecError>;

/// A single `execute` entry point: sync filesystems, invoke the system
/// reboot path inside the host namespace. Errors here leave the node in
/// `agent-state=rebooting` with `reboot-pending=true` so the next reconcile
/// retries (`spec.md` §7) — intentionally conservative.
#[async_trait]
pub trait RebootExecutor: Send + Sync {
    async fn execute(&self) -> Result<()>;
}
