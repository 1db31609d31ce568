use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ServiceManagerError {
    #[error("{phase}: {message}")]
    Phase { phase: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ServiceManagerError>;

/// The subset of `systemctl is-enabled` outcomes this engine reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFileState {
    Enabled,
    EnabledRuntime,
    Disabled,
    Masked,
    Other,
}

/// The subset of `systemctl is-active` outcomes this engine reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveState {
    Active,
    Inactive,
    Failed,
    Other,
}

/// Capability interface over the service-manager IPC (`spec.md` §9). Every
/// verb waits for the manager's completion signal before returning, per
/// §4.6; mask/enable/start are additionally idempotent at the call site
/// (`mco-agent::apply::unit`), not inside the trait, so a fake implementation
/// used in tests can still assert on call counts.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn get_unit_file_state(&self, unit: &str) -> Result<UnitFileState>;
    async fn get_active_state(&self, unit: &str) -> Result<ActiveState>;

    async fn mask(&self, unit: &str) -> Result<()>;
    async fn unmask(&self, unit: &str) -> Result<()>;
    async fn enable(&self, unit: &str) -> Result<()>;
    async fn disable(&self, unit: &str) -> Result<()>;
    async fn start(&self, unit: &str) -> Result<()>;
    async fn stop(&self, unit: &str) -> Result<()>;
    async fn restart(&self, unit: &str) -> Result<()>;
    async fn reload(&self, unit: &str) -> Result<()>;

    /// Release the manager connection at agent shutdown. Apply routines
    /// borrow the connection for the duration of a call; they never own it.
    async fn close(&self) -> Result<()>;
}
