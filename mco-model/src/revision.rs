use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fragment::{FileSpec, UnitSpec};
use crate::pool::{RebootPolicy};

/// Provenance entry: which fragment (and at what priority) contributed to a
/// rendered revision. Not part of the hash input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSource {
    pub name: String,
    pub priority: u32,
}

/// An immutable, content-addressed snapshot produced by the Revision
/// Builder (C4). `short_hash`/`full_hash` are derived solely from the
/// canonical form of `(files, units, reboot_required)` — `sources` and the
/// per-item reboot maps are ancillary and excluded from hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedRevision {
    /// `<pool>-<short_hash>`, possibly suffixed `-1`, `-2`, ... on collision.
    pub name: String,
    pub pool: String,
    pub short_hash: String,
    pub full_hash: String,
    pub files: Vec<FileSpec>,
    pub units: Vec<UnitSpec>,
    pub reboot_required: bool,
    pub file_reboot_required: BTreeMap<String, bool>,
    pub unit_reboot_required: BTreeMap<String, bool>,
    pub reboot_policy: RebootPolicy,
    /// Snapshotted from the pool's rollout policy at build time, same
    /// ancillary status as `reboot_policy` — not part of the hash input.
    pub apply_timeout_seconds: u32,
    pub sources: Vec<RevisionSource>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RenderedRevision {
    /// `true` when neither per-item reboot requirement map carries any
    /// entries — the trigger for the Reboot Decider's legacy-fallback path
    /// (spec §4.8, step 4).
    pub fn reboot_requirements_unpopulated(&self) -> bool {
        self.file_reboot_required.is_empty() && self.unit_reboot_required.is_empty()
    }
}
