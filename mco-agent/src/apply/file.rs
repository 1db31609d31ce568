//! C5 — File Applier. Atomic, idempotent write/delete under a host-root
//! prefix. Forward-only: a failure mid-batch stops further work and
//! reports the failing index; already-applied files are not rolled back.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use mco_model::{FileSpec, FileState};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum FileApplyError {
    #[error("file[{index}] path {path} is not absolute")]
    NotAbsolute { index: usize, path: String },

    #[error("file[{index}] invalid owner token {owner:?}")]
    InvalidOwner { index: usize, owner: String },

    #[error("file[{index}] path {path}: {source}")]
    Io {
        index: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolved numeric uid/gid pair. Chown is skipped entirely when
/// `apply_ownership` is disabled (testing), so this never needs to run as
/// root in CI.
#[derive(Debug, Clone, Copy)]
struct Owner {
    uid: Option<u32>,
    gid: Option<u32>,
}

fn parse_owner(index: usize, owner: &str) -> Result<Owner, FileApplyError> {
    let (user, group) = owner
        .split_once(':')
        .ok_or_else(|| FileApplyError::InvalidOwner {
            index,
            owner: owner.to_string(),
        })?;
    // Numeric-only resolution: the host-root prefix means `/etc/passwd`
    // lookups would resolve against this process's identity database, not
    // the target host's. Fragments are expected to use numeric ids or the
    // well-known "root:root" default, which maps to 0:0.
    let uid = resolve_id(index, user)?;
    let gid = resolve_id(index, group)?;
    Ok(Owner { uid, gid })
}

fn resolve_id(index: usize, token: &str) -> Result<Option<u32>, FileApplyError> {
    if token == "root" {
        return Ok(Some(0));
    }
    token
        .parse::<u32>()
        .map(Some)
        .map_err(|_| FileApplyError::InvalidOwner {
            index,
            owner: token.to_string(),
        })
}

/// A single host-root-scoped applier. Cheap to construct; holds no
/// resources of its own.
#[derive(Debug, Clone)]
pub struct FileApplier {
    host_root: PathBuf,
    apply_ownership: bool,
}

impl FileApplier {
    pub fn new(host_root: impl Into<PathBuf>, apply_ownership: bool) -> Self {
        Self {
            host_root: host_root.into(),
            apply_ownership,
        }
    }

    fn scoped_path(&self, path: &str) -> PathBuf {
        self.host_root.join(path.trim_start_matches('/'))
    }

    /// Apply one file spec. Returns `Ok(true)` when a write/delete actually
    /// happened, `Ok(false)` when the on-disk state already matched
    /// (idempotent no-op).
    pub async fn apply_one(&self, spec: &FileSpec, index: usize) -> Result<bool, FileApplyError> {
        if !spec.path.starts_with('/') {
            return Err(FileApplyError::NotAbsolute {
                index,
                path: spec.path.clone(),
            });
        }
        let target = self.scoped_path(&spec.path);

        match spec.state {
            FileState::Absent => self.apply_absent(&target, index, &spec.path).await,
            FileState::Present => self.apply_present(spec, &target, index).await,
        }
    }

    async fn apply_absent(
        &self,
        target: &Path,
        index: usize,
        path: &str,
    ) -> Result<bool, FileApplyError> {
        match tokio::fs::remove_file(target).await {
            Ok(()) => {
                info!(path, "removed file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FileApplyError::Io {
                index,
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn apply_present(
        &self,
        spec: &FileSpec,
        target: &Path,
        index: usize,
    ) -> Result<bool, FileApplyError> {
        let content = spec.content.as_deref().unwrap_or_default().as_bytes();

        if let Ok(existing) = tokio::fs::read(target).await {
            if existing == content {
                debug!(path = %spec.path, "file unchanged, skipping");
                return Ok(false);
            }
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FileApplyError::Io {
                    index,
                    path: spec.path.clone(),
                    source,
                })?;
            set_dir_mode(parent, 0o755).map_err(|source| FileApplyError::Io {
                index,
                path: spec.path.clone(),
                source,
            })?;
        }

        let tmp_path = sibling_temp_path(target);
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|source| FileApplyError::Io {
                index,
                path: spec.path.clone(),
                source,
            })?;

        set_file_mode(&tmp_path, spec.mode).map_err(|source| FileApplyError::Io {
            index,
            path: spec.path.clone(),
            source,
        })?;

        tokio::fs::rename(&tmp_path, target)
            .await
            .map_err(|source| FileApplyError::Io {
                index,
                path: spec.path.clone(),
                source,
            })?;

        if self.apply_ownership {
            let owner = parse_owner(index, &spec.owner)?;
            chown(target, owner).map_err(|source| FileApplyError::Io {
                index,
                path: spec.path.clone(),
                source,
            })?;
        }

        info!(path = %spec.path, mode = format!("{:o}", spec.mode), "wrote file");
        Ok(true)
    }

    /// Apply an ordered batch; stops at the first failure and reports its
    /// index (forward-only — files applied before the failure remain).
    pub async fn apply_all(&self, specs: &[FileSpec]) -> Result<usize, FileApplyError> {
        let mut applied = 0;
        for (index, spec) in specs.iter().enumerate() {
            if self.apply_one(spec, index).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn sibling_temp_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix: u32 = rand::random();
    target.with_file_name(format!(".{file_name}.mco-tmp-{suffix:08x}"))
}

fn set_file_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

fn set_dir_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

fn chown(path: &Path, owner: Owner) -> std::io::Result<()> {
    let uid = owner.uid.map(nix_uid);
    let gid = owner.gid.map(nix_gid);
    chown_raw(path, uid, gid)
}

// Thin wrappers kept separate so the unsafe libc call sites are small and
// auditable; no `nix`/`users` crate dependency is introduced for a single
// syscall.
fn nix_uid(v: u32) -> libc::uid_t {
    v as libc::uid_t
}

fn nix_gid(v: u32) -> libc::gid_t {
    v as libc::gid_t
}

fn chown_raw(path: &Path, uid: Option<libc::uid_t>, gid: Option<libc::gid_t>) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())?;
    let uid = uid.unwrap_or(u32::MAX);
    let gid = gid.unwrap_or(u32::MAX);
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn present_writes_and_is_idempotent_on_second_apply() {
        let dir = tempfile::tempdir().unwrap();
        let applier = FileApplier::new(dir.path(), false);
        let spec = FileSpec::present("/etc/mco-test/e2e-apply.conf", "hello");

        let wrote = applier.apply_one(&spec, 0).await.unwrap();
        assert!(wrote);
        let contents =
            tokio::fs::read_to_string(dir.path().join("etc/mco-test/e2e-apply.conf"))
                .await
                .unwrap();
        assert_eq!(contents, "hello");

        let wrote_again = applier.apply_one(&spec, 0).await.unwrap();
        assert!(!wrote_again, "second identical apply must be a no-op");
    }

    #[tokio::test]
    async fn absent_removes_and_missing_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let applier = FileApplier::new(dir.path(), false);
        let present = FileSpec::present("/etc/mco-test/e2e-apply.conf", "hello");
        applier.apply_one(&present, 0).await.unwrap();

        let absent = FileSpec::absent("/etc/mco-test/e2e-apply.conf");
        let removed = applier.apply_one(&absent, 0).await.unwrap();
        assert!(removed);
        assert!(!dir.path().join("etc/mco-test/e2e-apply.conf").exists());

        // Removing again: missing is not an error, and reports no-op.
        let removed_again = applier.apply_one(&absent, 0).await.unwrap();
        assert!(!removed_again);
    }

    #[tokio::test]
    async fn rejects_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let applier = FileApplier::new(dir.path(), false);
        let spec = FileSpec::present("etc/not-absolute", "x");
        let err = applier.apply_one(&spec, 3).await.unwrap_err();
        match err {
            FileApplyError::NotAbsolute { index, .. } => assert_eq!(index, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure_and_reports_index() {
        let dir = tempfile::tempdir().unwrap();
        let applier = FileApplier::new(dir.path(), false);
        let specs = vec![
            FileSpec::present("/etc/mco-test/a", "a"),
            FileSpec::present("bad-relative", "x"),
            FileSpec::present("/etc/mco-test/c", "c"),
        ];
        let err = applier.apply_all(&specs).await.unwrap_err();
        match err {
            FileApplyError::NotAbsolute { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        // Already-applied file from before the failure remains (forward-only).
        assert!(dir.path().join("etc/mco-test/a").exists());
        assert!(!dir.path().join("etc/mco-test/c").exists());
    }
}
