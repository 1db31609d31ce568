//! C6 — Unit Applier. Drives a `ServiceManager` through the
//! mask/unmask → enable/disable → state-verb sequence, skipping any step
//! whose effect already holds except `restart`/`reload`, which always run.

use mco_contracts::service_manager::{
    ActiveState, ServiceManager, ServiceManagerError, UnitFileState,
};
use mco_model::{UnitSpec, UnitState};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone)]
pub enum UnitApplyError {
    #[error("unit[{index}] {name}: {source}")]
    Manager {
        index: usize,
        name: String,
        #[source]
        source: ServiceManagerError,
    },
}

pub struct UnitApplier<'a> {
    manager: &'a dyn ServiceManager,
}

impl<'a> UnitApplier<'a> {
    pub fn new(manager: &'a dyn ServiceManager) -> Self {
        Self { manager }
    }

    pub async fn apply_one(&self, spec: &UnitSpec, index: usize) -> Result<(), UnitApplyError> {
        let wrap = |source| UnitApplyError::Manager {
            index,
            name: spec.name.clone(),
            source,
        };

        self.apply_mask(spec).await.map_err(wrap)?;
        self.apply_enable(spec).await.map_err(wrap)?;
        self.apply_state(spec).await.map_err(wrap)?;
        Ok(())
    }

    pub async fn apply_all(&self, specs: &[UnitSpec]) -> Result<(), UnitApplyError> {
        for (index, spec) in specs.iter().enumerate() {
            self.apply_one(spec, index).await?;
        }
        Ok(())
    }

    async fn apply_mask(&self, spec: &UnitSpec) -> Result<(), ServiceManagerError> {
        let current = self.manager.get_unit_file_state(&spec.name).await?;

        if spec.mask {
            if current != UnitFileState::Masked {
                self.manager.mask(&spec.name).await?;
                info!(unit = %spec.name, "masked");
            } else {
                debug!(unit = %spec.name, "already masked");
            }
        } else if current == UnitFileState::Masked {
            self.manager.unmask(&spec.name).await?;
            info!(unit = %spec.name, "unmasked");
        }
        Ok(())
    }

    async fn apply_enable(&self, spec: &UnitSpec) -> Result<(), ServiceManagerError> {
        let Some(desired) = spec.enabled else {
            debug!(unit = %spec.name, "no opinion on enablement");
            return Ok(());
        };
        let current = self.manager.get_unit_file_state(&spec.name).await?;

        if desired && current != UnitFileState::Enabled {
            self.manager.enable(&spec.name).await?;
            info!(unit = %spec.name, "enabled");
        } else if !desired && current == UnitFileState::Enabled {
            self.manager.disable(&spec.name).await?;
            info!(unit = %spec.name, "disabled");
        } else {
            debug!(unit = %spec.name, "enable state already matches");
        }
        Ok(())
    }

    async fn apply_state(&self, spec: &UnitSpec) -> Result<(), ServiceManagerError> {
        let Some(state) = spec.state else {
            debug!(unit = %spec.name, "no opinion on run state");
            return Ok(());
        };

        match state {
            UnitState::Started => {
                let active = self.manager.get_active_state(&spec.name).await?;
                if active != ActiveState::Active {
                    self.manager.start(&spec.name).await?;
                    info!(unit = %spec.name, "started");
                } else {
                    debug!(unit = %spec.name, "already active");
                }
            }
            UnitState::Stopped => {
                let active = self.manager.get_active_state(&spec.name).await?;
                if active == ActiveState::Active {
                    self.manager.stop(&spec.name).await?;
                    info!(unit = %spec.name, "stopped");
                } else {
                    debug!(unit = %spec.name, "already inactive");
                }
            }
            UnitState::Restarted => {
                self.manager.restart(&spec.name).await?;
                info!(unit = %spec.name, "restarted");
            }
            UnitState::Reloaded => {
                self.manager.reload(&spec.name).await?;
                info!(unit = %spec.name, "reloaded");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_contracts::testing::FakeServiceManager;

    #[tokio::test]
    async fn started_unit_skips_start_when_already_active() {
        let manager = FakeServiceManager::new();
        manager.seed_active_state("sshd.service", ActiveState::Active);
        let applier = UnitApplier::new(&manager);
        let mut spec = UnitSpec::new("sshd.service");
        spec.state = Some(UnitState::Started);

        applier.apply_one(&spec, 0).await.unwrap();
        assert_eq!(manager.call_count("start", "sshd.service"), 0);
    }

    #[tokio::test]
    async fn started_unit_starts_when_inactive() {
        let manager = FakeServiceManager::new();
        let applier = UnitApplier::new(&manager);
        let mut spec = UnitSpec::new("sshd.service");
        spec.state = Some(UnitState::Started);

        applier.apply_one(&spec, 0).await.unwrap();
        assert_eq!(manager.call_count("start", "sshd.service"), 1);
    }

    #[tokio::test]
    async fn restart_always_runs_even_when_active() {
        let manager = FakeServiceManager::new();
        manager.seed_active_state("sshd.service", ActiveState::Active);
        let applier = UnitApplier::new(&manager);
        let mut spec = UnitSpec::new("sshd.service");
        spec.state = Some(UnitState::Restarted);

        applier.apply_one(&spec, 0).await.unwrap();
        assert_eq!(manager.call_count("restart", "sshd.service"), 1);
    }

    #[tokio::test]
    async fn mask_skips_when_already_masked() {
        let manager = FakeServiceManager::new();
        manager.seed_file_state("avahi-daemon.service", UnitFileState::Masked);
        let applier = UnitApplier::new(&manager);
        let mut spec = UnitSpec::new("avahi-daemon.service");
        spec.mask = true;
        spec.state = Some(UnitState::Stopped);

        applier.apply_one(&spec, 0).await.unwrap();
        assert_eq!(manager.call_count("mask", "avahi-daemon.service"), 0);
    }

    #[tokio::test]
    async fn no_opinion_on_enabled_skips_enable_phase_entirely() {
        let manager = FakeServiceManager::new();
        let applier = UnitApplier::new(&manager);
        let spec = UnitSpec::new("sshd.service");

        applier.apply_one(&spec, 0).await.unwrap();
        assert_eq!(manager.call_count("enable", "sshd.service"), 0);
        assert_eq!(manager.call_count("disable", "sshd.service"), 0);
    }
}
