//! Default `ServiceManager`: shells out to `systemctl`. Kept process-based
//! for the same reason as `system_reboot` — no D-Bus dependency is carried
//! for a single-host agent that already shells out for the reboot path.

use async_trait::async_trait;
use mco_contracts::service_manager::{
    ActiveState, ServiceManager, ServiceManagerError, UnitFileState,
};
use tokio::process::Command;

type SmResult<T> = std::result::Result<T, ServiceManagerError>;

fn phase_err(phase: &'static str, message: impl Into<String>) -> ServiceManagerError {
    ServiceManagerError::Phase {
        phase,
        message: message.into(),
    }
}

#[derive(Debug, Default)]
pub struct SystemServiceManager;

impl SystemServiceManager {
    async fn run(&self, phase: &'static str, args: &[&str]) -> SmResult<String> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .await
            .map_err(|e| phase_err(phase, e.to_string()))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_checked(&self, phase: &'static str, args: &[&str]) -> SmResult<()> {
        let status = Command::new("systemctl")
            .args(args)
            .status()
            .await
            .map_err(|e| phase_err(phase, e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(phase_err(phase, format!("systemctl exited with {status}")))
        }
    }
}

#[async_trait]
impl ServiceManager for SystemServiceManager {
    async fn get_unit_file_state(&self, unit: &str) -> SmResult<UnitFileState> {
        let out = self
            .run("get_unit_file_state", &["is-enabled", unit])
            .await?;
        Ok(match out.as_str() {
            "enabled" => UnitFileState::Enabled,
            "enabled-runtime" => UnitFileState::EnabledRuntime,
            "disabled" => UnitFileState::Disabled,
            "masked" | "masked-runtime" => UnitFileState::Masked,
            _ => UnitFileState::Other,
        })
    }

    async fn get_active_state(&self, unit: &str) -> SmResult<ActiveState> {
        let out = self.run("get_active_state", &["is-active", unit]).await?;
        Ok(match out.as_str() {
            "active" => ActiveState::Active,
            "inactive" => ActiveState::Inactive,
            "failed" => ActiveState::Failed,
            _ => ActiveState::Other,
        })
    }

    async fn mask(&self, unit: &str) -> SmResult<()> {
        self.run_checked("mask", &["mask", unit]).await
    }

    async fn unmask(&self, unit: &str) -> SmResult<()> {
        self.run_checked("unmask", &["unmask", unit]).await
    }

    async fn enable(&self, unit: &str) -> SmResult<()> {
        self.run_checked("enable", &["enable", unit]).await
    }

    async fn disable(&self, unit: &str) -> SmResult<()> {
        self.run_checked("disable", &["disable", unit]).await
    }

    async fn start(&self, unit: &str) -> SmResult<()> {
        self.run_checked("start", &["start", unit]).await
    }

    async fn stop(&self, unit: &str) -> SmResult<()> {
        self.run_checked("stop", &["stop", unit]).await
    }

    async fn restart(&self, unit: &str) -> SmResult<()> {
        self.run_checked("restart", &["restart", unit]).await
    }

    async fn reload(&self, unit: &str) -> SmResult<()> {
        self.run_checked("reload", &["reload", unit]).await
    }

    async fn close(&self) -> SmResult<()> {
        Ok(())
    }
}
