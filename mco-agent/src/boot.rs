//! Boot-marker detection. A prior reconcile records that it kicked off a
//! reboot by writing a sentinel file under a tmpfs mount; its absence after
//! a fresh boot is the signal that the reboot the agent was waiting for
//! actually happened. `/proc/uptime` is read only for diagnostics — the
//! open question in `spec.md` §9 resolves against the boot marker, never
//! against uptime, since uptime survives kexec and container restarts in
//! ways that make it an unreliable reboot signal.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum BootError {
    #[error("boot marker I/O at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct BootMarker {
    path: PathBuf,
}

impl BootMarker {
    /// `host_root` is the agent's `--host-root`; the marker lives at
    /// `<host-root>/run/mco/boot-marker`, matching `spec.md` §6's on-disk
    /// layout.
    pub fn new(host_root: impl AsRef<Path>) -> Self {
        Self {
            path: host_root.as_ref().join("run/mco/boot-marker"),
        }
    }

    /// Write the marker just before invoking the reboot executor. tmpfs
    /// does not survive a reboot, so the marker's disappearance after a
    /// fresh boot is itself the "reboot completed" signal; no timestamp
    /// comparison is needed.
    pub async fn arm(&self, revision: &str) -> Result<(), BootError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| BootError::Io {
                    path: self.path.display().to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&self.path, revision)
            .await
            .map_err(|source| BootError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        info!(path = %self.path.display(), revision, "armed reboot boot marker");
        Ok(())
    }

    /// `true` when the marker is present, meaning the reboot this agent
    /// requested has not yet happened (or the agent restarted without a
    /// reboot actually occurring).
    pub async fn is_armed(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read back the revision recorded when the marker was armed, if any.
    pub async fn armed_revision(&self) -> Option<String> {
        tokio::fs::read_to_string(&self.path).await.ok()
    }

    pub async fn disarm(&self) -> Result<(), BootError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BootError::Io {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }
}

/// Observability-only: seconds since boot, or `None` if `/proc/uptime` is
/// unreadable (non-Linux test hosts, restricted containers). Never used to
/// decide whether a reboot happened.
pub async fn uptime_seconds() -> Option<f64> {
    let raw = tokio::fs::read_to_string("/proc/uptime").await.ok()?;
    let first = raw.split_whitespace().next()?;
    match first.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(raw, "unparseable /proc/uptime contents");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn arm_then_is_armed_then_disarm() {
        let dir = tempfile::tempdir().unwrap();
        let marker = BootMarker::new(dir.path());

        assert!(!marker.is_armed().await);
        marker.arm("workers-abc1234567").await.unwrap();
        assert!(marker.is_armed().await);
        assert_eq!(
            marker.armed_revision().await.as_deref(),
            Some("workers-abc1234567")
        );

        marker.disarm().await.unwrap();
        assert!(!marker.is_armed().await);
    }

    #[tokio::test]
    async fn disarm_without_marker_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let marker = BootMarker::new(dir.path());
        marker.disarm().await.unwrap();
    }
}
