//! C3 — Hasher. Produces a canonical JSON encoding of a merged config and a
//! 64-hex SHA-256 over it, plus a 10-hex short form. Determinism is the
//! hard guarantee this module exists to provide (`spec.md` §8, invariant 1).

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::merge::MergedConfig;

/// Build the canonical JSON object used as hash input: a compact object
/// with alphabetically ordered top-level fields `{files, reboot, systemd}`,
/// files sorted by path, units sorted by name. `sources` and the per-item
/// reboot maps are excluded — they're provenance, not content.
///
/// Field insertion order below is fixed (alphabetical) rather than relying
/// on `serde_json`'s insertion-ordered `Map`, so the canonical form is
/// stable without enabling `preserve_order`/`arbitrary_precision` features.
pub fn canonical_json(merged: &MergedConfig) -> Value {
    let mut root = Map::new();

    let files: Vec<Value> = merged
        .files
        .iter()
        .map(|f| {
            let mut file = Map::new();
            file.insert(
                "content".to_string(),
                f.content
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );
            file.insert("mode".to_string(), Value::from(f.mode));
            file.insert("owner".to_string(), Value::String(f.owner.clone()));
            file.insert("path".to_string(), Value::String(f.path.clone()));
            file.insert(
                "state".to_string(),
                Value::String(match f.state {
                    mco_model::FileState::Present => "present".to_string(),
                    mco_model::FileState::Absent => "absent".to_string(),
                }),
            );
            Value::Object(file)
        })
        .collect();
    root.insert("files".to_string(), Value::Array(files));

    let mut reboot = Map::new();
    reboot.insert("required".to_string(), Value::Bool(merged.reboot_required));
    root.insert("reboot".to_string(), Value::Object(reboot));

    let units: Vec<Value> = merged
        .units
        .iter()
        .map(|u| {
            let mut unit = Map::new();
            if let Some(enabled) = u.enabled {
                unit.insert("enabled".to_string(), Value::Bool(enabled));
            }
            unit.insert("mask".to_string(), Value::Bool(u.mask));
            unit.insert("name".to_string(), Value::String(u.name.clone()));
            if let Some(state) = u.state {
                unit.insert(
                    "state".to_string(),
                    Value::String(
                        match state {
                            mco_model::UnitState::Started => "started",
                            mco_model::UnitState::Stopped => "stopped",
                            mco_model::UnitState::Restarted => "restarted",
                            mco_model::UnitState::Reloaded => "reloaded",
                        }
                        .to_string(),
                    ),
                );
            }
            Value::Object(unit)
        })
        .collect();
    let mut systemd = Map::new();
    systemd.insert("units".to_string(), Value::Array(units));
    root.insert("systemd".to_string(), Value::Object(systemd));

    Value::Object(root)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hash {
    pub full: String,
    pub short: String,
}

/// Hash a merged config. `files`/`units` are re-sorted defensively here
/// (the Merger already sorts, but the Hasher must not trust the caller for
/// the determinism guarantee to be load-bearing on its own).
pub fn hash(merged: &MergedConfig) -> Hash {
    let mut sorted = merged.clone();
    sorted.files.sort_by(|a, b| a.path.cmp(&b.path));
    sorted.units.sort_by(|a, b| a.name.cmp(&b.name));

    let canonical = canonical_json(&sorted);
    let bytes = serde_json::to_vec(&canonical).expect("canonical json is always serializable");

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    let full_hex = hex::encode(digest);

    Hash {
        short: full_hex[..10].to_string(),
        full: format!("sha256:{full_hex}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge;
    use mco_model::{FileSpec, Fragment};

    #[test]
    fn hash_is_deterministic_across_runs() {
        let mut f = Fragment::new("f", 10);
        f.files.push(FileSpec::present("/etc/x", "hello"));
        let merged = merge(&[f]);
        let a = hash(&merged);
        let b = hash(&merged);
        assert_eq!(a, b);
        assert_eq!(a.full.len(), "sha256:".len() + 64);
        assert_eq!(a.short.len(), 10);
    }

    #[test]
    fn hash_is_insensitive_to_input_order() {
        let mut a = Fragment::new("a", 10);
        a.files.push(FileSpec::present("/etc/a", "a"));
        let mut b = Fragment::new("b", 20);
        b.files.push(FileSpec::present("/etc/b", "b"));

        let forward = hash(&merge(&[a.clone(), b.clone()]));
        let backward = hash(&merge(&[b, a]));
        assert_eq!(forward, backward);
    }

    #[test]
    fn sources_and_reboot_maps_are_excluded_from_hash() {
        let mut f1 = Fragment::new("f1", 10);
        f1.files.push(FileSpec::present("/etc/x", "v"));
        let mut f2 = Fragment::new("f2", 10);
        f2.files.push(FileSpec::present("/etc/x", "v"));
        f2.reboot_required = false;

        // Different fragment names/priorities feeding the same final
        // content must hash identically: sources aren't hashed.
        let h1 = hash(&merge(&[f1]));
        let h2 = hash(&merge(&[f2]));
        assert_eq!(h1, h2);
    }
}
