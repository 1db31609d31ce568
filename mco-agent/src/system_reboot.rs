//! Default `RebootExecutor`: shells out to `systemctl reboot`. No D-Bus
//! client is introduced since nothing in the retrieval pack depends on one;
//! `tokio::process::Command` mirrors the teacher's own use of subprocess
//! invocation for out-of-process work.

use async_trait::async_trait;
use mco_contracts::reboot::{RebootExecError, RebootExecutor, Result};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Default)]
pub struct SystemRebootExecutor;

#[async_trait]
impl RebootExecutor for SystemRebootExecutor {
    async fn execute(&self) -> Result<()> {
        info!("invoking systemctl reboot");
        let status = Command::new("systemctl")
            .arg("reboot")
            .status()
            .await
            .map_err(|e| RebootExecError::Failed(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(RebootExecError::Failed(format!(
                "systemctl reboot exited with {status}"
            )))
        }
    }
}
