//! C8 — Diff Engine. Compares two slices of file specs or unit specs by
//! key, producing a sorted list of added/modified/removed changes.

use mco_model::{FileSpec, UnitSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub key: String,
    pub change_type: ChangeType,
}

fn files_equal(a: &FileSpec, b: &FileSpec) -> bool {
    a.content == b.content && a.mode == b.mode && a.owner == b.owner && a.state == b.state
}

fn units_equal(a: &UnitSpec, b: &UnitSpec) -> bool {
    a.enabled == b.enabled && a.state == b.state && a.mask == b.mask
}

/// Diff two file-spec slices by `path`.
pub fn diff_files(from: &[FileSpec], to: &[FileSpec]) -> Vec<Change> {
    diff_by_key(
        from,
        to,
        |f| f.path.clone(),
        files_equal,
    )
}

/// Diff two unit-spec slices by `name`.
pub fn diff_units(from: &[UnitSpec], to: &[UnitSpec]) -> Vec<Change> {
    diff_by_key(
        from,
        to,
        |u| u.name.clone(),
        units_equal,
    )
}

fn diff_by_key<T>(
    from: &[T],
    to: &[T],
    key_of: impl Fn(&T) -> String,
    equal: impl Fn(&T, &T) -> bool,
) -> Vec<Change> {
    use std::collections::BTreeMap;

    let from_map: BTreeMap<String, &T> = from.iter().map(|i| (key_of(i), i)).collect();
    let to_map: BTreeMap<String, &T> = to.iter().map(|i| (key_of(i), i)).collect();

    let mut keys: Vec<&String> = from_map.keys().chain(to_map.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut changes = Vec::new();
    for key in keys {
        match (from_map.get(key), to_map.get(key)) {
            (None, Some(_)) => changes.push(Change {
                key: key.clone(),
                change_type: ChangeType::Added,
            }),
            (Some(_), None) => changes.push(Change {
                key: key.clone(),
                change_type: ChangeType::Removed,
            }),
            (Some(a), Some(b)) => {
                if !equal(a, b) {
                    changes.push(Change {
                        key: key.clone(),
                        change_type: ChangeType::Modified,
                    });
                }
            }
            (None, None) => unreachable!(),
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_model::FileSpec;

    #[test]
    fn diff_detects_added_modified_removed() {
        let from = vec![
            FileSpec::present("/etc/keep", "same"),
            FileSpec::present("/etc/change", "old"),
            FileSpec::present("/etc/gone", "bye"),
        ];
        let to = vec![
            FileSpec::present("/etc/keep", "same"),
            FileSpec::present("/etc/change", "new"),
            FileSpec::present("/etc/new", "hi"),
        ];
        let changes = diff_files(&from, &to);
        assert_eq!(
            changes,
            vec![
                Change { key: "/etc/change".into(), change_type: ChangeType::Modified },
                Change { key: "/etc/gone".into(), change_type: ChangeType::Removed },
                Change { key: "/etc/new".into(), change_type: ChangeType::Added },
            ]
        );
    }

    #[test]
    fn diff_reconstructs_b_from_a() {
        let a = vec![
            FileSpec::present("/etc/keep", "same"),
            FileSpec::present("/etc/gone", "bye"),
        ];
        let b = vec![
            FileSpec::present("/etc/keep", "same"),
            FileSpec::present("/etc/new", "hi"),
        ];
        let changes = diff_files(&a, &b);

        // Applying "added/modified -> take b's value, removed -> delete"
        // over `a` must reconstruct `b` exactly.
        use std::collections::BTreeMap;
        let mut reconstructed: BTreeMap<String, FileSpec> =
            a.iter().map(|f| (f.path.clone(), f.clone())).collect();
        let b_map: BTreeMap<String, FileSpec> =
            b.iter().map(|f| (f.path.clone(), f.clone())).collect();
        for change in &changes {
            match change.change_type {
                ChangeType::Added | ChangeType::Modified => {
                    reconstructed.insert(change.key.clone(), b_map[&change.key].clone());
                }
                ChangeType::Removed => {
                    reconstructed.remove(&change.key);
                }
            }
        }
        assert_eq!(reconstructed, b_map);
    }
}
