//! C4 — Revision Builder & collision policy. Assembles an immutable
//! `RenderedRevision` from a merge+hash result and a pool's reboot policy,
//! resolving name collisions against whatever the object-store already
//! holds for that name.

use chrono::Utc;
use mco_contracts::{ObjectStore, StoreError};
use mco_model::{MachineConfigPool, RenderedRevision};
use thiserror::Error;
use tracing::info;

use crate::hash::hash;
use crate::merge::MergedConfig;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of `build_revision`: whether a new object was actually written,
/// so the caller can decide whether to emit a `CollisionObserved` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Created,
    Reused,
    CollisionResolved { attempts: u32 },
}

pub struct BuildResult {
    pub revision: RenderedRevision,
    pub outcome: BuildOutcome,
}

/// Build and persist a revision for `pool` from `merged`, resolving name
/// collisions by appending `-1`, `-2`, ... (`spec.md` §4.4).
pub async fn build_revision(
    store: &dyn ObjectStore,
    pool: &MachineConfigPool,
    merged: &MergedConfig,
) -> Result<BuildResult, BuildError> {
    let digest = hash(merged);
    let base_name = format!("{}-{}", pool.name, digest.short);

    let mut candidate_name = base_name.clone();
    let mut attempts: u32 = 0;

    loop {
        match store.get_revision(&candidate_name).await {
            Err(StoreError::NotFound(_)) => {
                let revision = RenderedRevision {
                    name: candidate_name.clone(),
                    pool: pool.name.clone(),
                    short_hash: digest.short.clone(),
                    full_hash: digest.full.clone(),
                    files: merged.files.clone(),
                    units: merged.units.clone(),
                    reboot_required: merged.reboot_required,
                    file_reboot_required: merged.file_reboot_required.clone(),
                    unit_reboot_required: merged.unit_reboot_required.clone(),
                    reboot_policy: pool.reboot,
                    apply_timeout_seconds: pool.rollout.apply_timeout_seconds,
                    sources: merged.sources.clone(),
                    created_at: Utc::now(),
                };
                store.create_revision(&revision).await?;
                let outcome = if attempts == 0 {
                    BuildOutcome::Created
                } else {
                    info!(pool = %pool.name, name = %candidate_name, attempts, "revision name collision resolved");
                    BuildOutcome::CollisionResolved { attempts }
                };
                return Ok(BuildResult { revision, outcome });
            }
            Ok(existing) if existing.full_hash == digest.full => {
                return Ok(BuildResult {
                    revision: existing,
                    outcome: BuildOutcome::Reused,
                });
            }
            Ok(_) => {
                attempts += 1;
                candidate_name = format!("{base_name}-{attempts}");
            }
            Err(other) => return Err(other.into()),
        }
    }
}
