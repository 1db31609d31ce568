//! C10 — Reboot Handler. Wraps the Reboot Decider's verdict with the
//! pool's `RebootStrategy`, the node's `force-reboot` override, and the
//! minimum-interval guard, then invokes the `RebootExecutor`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mco_contracts::reboot::{RebootExecError, RebootExecutor};
use mco_core::reboot_decision::RebootDecision;
use mco_model::{RebootPolicy, RebootStrategy};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RebootHandlerError {
    #[error("reboot state I/O at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Exec(#[from] RebootExecError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootOutcome {
    /// No reboot requested by the decision, or the strategy/interval/force
    /// combination suppressed it.
    Skipped { reason: String },
    Executed,
}

/// Tracks the last reboot timestamp this agent issued, so a `min_interval`
/// guard survives process restarts. Persisted as plain RFC3339 text, via
/// the same sibling-temp-then-rename pattern as the file applier.
pub struct LastRebootStore {
    path: PathBuf,
}

impl LastRebootStore {
    /// `host_root` is the agent's `--host-root`; the timestamp lives at
    /// `<host-root>/var/lib/mco/last-reboot`, matching `spec.md` §6's
    /// on-disk layout.
    pub fn new(host_root: impl AsRef<Path>) -> Self {
        Self {
            path: host_root.as_ref().join("var/lib/mco/last-reboot"),
        }
    }

    pub async fn read(&self) -> Option<DateTime<Utc>> {
        let raw = tokio::fs::read_to_string(&self.path).await.ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub async fn write(&self, at: DateTime<Utc>) -> Result<(), RebootHandlerError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RebootHandlerError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, at.to_rfc3339())
            .await
            .map_err(|source| RebootHandlerError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| RebootHandlerError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(())
    }
}

/// Evaluate policy + decision + overrides, execute a reboot if warranted,
/// and persist the new last-reboot timestamp on success.
pub async fn handle(
    policy: &RebootPolicy,
    decision: &RebootDecision,
    force: bool,
    now: DateTime<Utc>,
    store: &LastRebootStore,
    executor: &dyn RebootExecutor,
) -> Result<RebootOutcome, RebootHandlerError> {
    if !decision.required && !force {
        return Ok(RebootOutcome::Skipped {
            reason: "no reboot requirement".to_string(),
        });
    }

    if !force {
        if policy.strategy == RebootStrategy::Never {
            return Ok(RebootOutcome::Skipped {
                reason: "strategy is Never".to_string(),
            });
        }

        if let Some(last) = store.read().await {
            let elapsed = (now - last).num_seconds();
            if elapsed < i64::from(policy.min_interval_seconds) {
                return Ok(RebootOutcome::Skipped {
                    reason: format!(
                        "min_interval_seconds not elapsed ({elapsed}s < {}s)",
                        policy.min_interval_seconds
                    ),
                });
            }
        }
    } else {
        info!("force-reboot override bypasses strategy and min-interval checks");
    }

    info!(reasons = ?decision.reasons, "executing reboot");
    executor.execute().await?;
    store.write(now).await?;
    Ok(RebootOutcome::Executed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_contracts::testing::NoopRebootExecutor;
    use mco_core::reboot_decision::RebootMethod;

    fn decision(required: bool) -> RebootDecision {
        RebootDecision {
            required,
            method: RebootMethod::DiffBased,
            reasons: vec!["test".to_string()],
        }
    }

    #[tokio::test]
    async fn never_strategy_skips_even_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastRebootStore::new(dir.path());
        let executor = NoopRebootExecutor::default();
        let policy = RebootPolicy {
            strategy: RebootStrategy::Never,
            min_interval_seconds: 0,
        };

        let outcome = handle(&policy, &decision(true), false, Utc::now(), &store, &executor)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RebootOutcome::Skipped {
                reason: "strategy is Never".to_string()
            }
        );
        assert_eq!(*executor.invocations.lock(), 0);
    }

    #[tokio::test]
    async fn if_required_strategy_executes_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastRebootStore::new(dir.path());
        let executor = NoopRebootExecutor::default();
        let policy = RebootPolicy {
            strategy: RebootStrategy::IfRequired,
            min_interval_seconds: 0,
        };

        let outcome = handle(&policy, &decision(true), false, Utc::now(), &store, &executor)
            .await
            .unwrap();
        assert_eq!(outcome, RebootOutcome::Executed);
        assert_eq!(*executor.invocations.lock(), 1);
        assert!(store.read().await.is_some());
    }

    #[tokio::test]
    async fn min_interval_suppresses_a_second_reboot_too_soon() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastRebootStore::new(dir.path());
        let executor = NoopRebootExecutor::default();
        let policy = RebootPolicy {
            strategy: RebootStrategy::IfRequired,
            min_interval_seconds: 3600,
        };
        let now = Utc::now();

        handle(&policy, &decision(true), false, now, &store, &executor)
            .await
            .unwrap();
        let outcome = handle(&policy, &decision(true), false, now, &store, &executor)
            .await
            .unwrap();
        match outcome {
            RebootOutcome::Skipped { reason } => assert!(reason.contains("min_interval_seconds")),
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(*executor.invocations.lock(), 1);
    }

    #[tokio::test]
    async fn force_reboot_bypasses_never_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastRebootStore::new(dir.path());
        let executor = NoopRebootExecutor::default();
        let policy = RebootPolicy {
            strategy: RebootStrategy::Never,
            min_interval_seconds: 0,
        };

        let outcome = handle(&policy, &decision(false), true, Utc::now(), &store, &executor)
            .await
            .unwrap();
        assert_eq!(outcome, RebootOutcome::Executed);
    }
}
