//! C2 — Merger. Deterministically folds N fragments into one merged
//! config, tracking per-item provenance and per-item reboot requirement.
//! Pure; validation precedes merge so this module never errors.

use std::collections::BTreeMap;

use mco_model::{FileSpec, Fragment, RevisionSource, UnitSpec};

/// Output of folding a fragment list: files/units sorted by key, aggregate
/// reboot flag (legacy OR), sources in priority order, and per-item reboot
/// maps recording which contributing fragment set the flag for the item
/// that ultimately won the key.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfig {
    pub files: Vec<FileSpec>,
    pub units: Vec<UnitSpec>,
    pub reboot_required: bool,
    pub sources: Vec<RevisionSource>,
    pub file_reboot_required: BTreeMap<String, bool>,
    pub unit_reboot_required: BTreeMap<String, bool>,
}

/// Fold a fragment list into a single merged config.
///
/// Algorithm (spec.md §4.2): stable-sort by `(priority ASC, name ASC)`, then
/// iterate in that order writing each fragment's files/units into maps
/// keyed by path/name — later writes overwrite earlier, so at equal
/// priority the alphabetically-larger name wins (S3 in spec.md §8).
pub fn merge(fragments: &[Fragment]) -> MergedConfig {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));

    let mut files: BTreeMap<String, FileSpec> = BTreeMap::new();
    let mut units: BTreeMap<String, UnitSpec> = BTreeMap::new();
    let mut file_reboot_required: BTreeMap<String, bool> = BTreeMap::new();
    let mut unit_reboot_required: BTreeMap<String, bool> = BTreeMap::new();
    let mut aggregate_reboot = false;

    for fragment in &ordered {
        aggregate_reboot |= fragment.reboot_required;
        for file in &fragment.files {
            files.insert(file.path.clone(), file.clone());
            file_reboot_required.insert(file.path.clone(), fragment.reboot_required);
        }
        for unit in &fragment.units {
            units.insert(unit.name.clone(), unit.clone());
            unit_reboot_required.insert(unit.name.clone(), fragment.reboot_required);
        }
    }

    let sources = ordered
        .iter()
        .map(|f| RevisionSource {
            name: f.name.clone(),
            priority: f.priority,
        })
        .collect();

    MergedConfig {
        files: files.into_values().collect(),
        units: units.into_values().collect(),
        reboot_required: aggregate_reboot,
        sources,
        file_reboot_required,
        unit_reboot_required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_model::FileSpec;

    #[test]
    fn equal_priority_alphabetically_larger_name_wins() {
        let mut base = Fragment::new("00-base", 50);
        base.files.push(FileSpec::present("/etc/config", "base"));
        let mut over = Fragment::new("99-override", 50);
        over.files.push(FileSpec::present("/etc/config", "override"));

        let merged = merge(&[base, over]);
        assert_eq!(merged.files.len(), 1);
        assert_eq!(merged.files[0].content.as_deref(), Some("override"));
    }

    #[test]
    fn merge_is_order_independent() {
        let mut a = Fragment::new("a", 10);
        a.files.push(FileSpec::present("/etc/a", "a"));
        let mut b = Fragment::new("b", 20);
        b.files.push(FileSpec::present("/etc/b", "b"));

        let forward = merge(&[a.clone(), b.clone()]);
        let backward = merge(&[b, a]);
        assert_eq!(forward.files, backward.files);
        assert_eq!(forward.units, backward.units);
    }

    #[test]
    fn aggregate_reboot_is_or_over_sources() {
        let mut quiet = Fragment::new("quiet", 10);
        quiet.files.push(FileSpec::present("/etc/quiet", "1"));
        let mut loud = Fragment::new("loud", 20);
        loud.reboot_required = true;
        loud.files.push(FileSpec::present("/etc/loud", "1"));

        let merged = merge(&[quiet, loud]);
        assert!(merged.reboot_required);
        assert_eq!(merged.file_reboot_required.get("/etc/quiet"), Some(&false));
        assert_eq!(merged.file_reboot_required.get("/etc/loud"), Some(&true));
    }

    #[test]
    fn single_fragment_projects_to_canonical_form() {
        let mut only = Fragment::new("only", 5);
        only.files.push(FileSpec::present("/etc/x", "v"));
        let merged = merge(&[only.clone()]);
        assert_eq!(merged.files, only.files);
        assert_eq!(merged.sources, vec![RevisionSource { name: "only".into(), priority: 5 }]);
    }
}
