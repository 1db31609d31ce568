//! C9 — Reboot Decider. Uses the diff (C8) plus per-item reboot
//! requirement maps, with a legacy-OR fallback, to decide whether a
//! transition from `current` to `new` requires a reboot.

use mco_contracts::ObjectStore;
use mco_model::RenderedRevision;

use crate::diff::{diff_files, diff_units, Change, ChangeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootMethod {
    LegacyFirstApply,
    SameRevision,
    LegacyFallback,
    DiffBased,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootDecision {
    pub required: bool,
    pub method: RebootMethod,
    pub reasons: Vec<String>,
}

fn change_label(change_type: ChangeType) -> &'static str {
    match change_type {
        ChangeType::Added => "added",
        ChangeType::Modified => "modified",
        ChangeType::Removed => "removed",
    }
}

/// `spec.md` §4.8's five-step decision tree.
pub async fn decide(
    store: &dyn ObjectStore,
    current: Option<&str>,
    new: &RenderedRevision,
) -> RebootDecision {
    let Some(current_name) = current else {
        return RebootDecision {
            required: new.reboot_required,
            method: RebootMethod::LegacyFirstApply,
            reasons: vec!["first apply: no current revision".to_string()],
        };
    };

    if current_name == new.name {
        return RebootDecision {
            required: false,
            method: RebootMethod::SameRevision,
            reasons: vec![],
        };
    }

    let current_revision = match store.get_revision(current_name).await {
        Ok(rev) => rev,
        Err(_) => {
            return RebootDecision {
                required: new.reboot_required,
                method: RebootMethod::LegacyFallback,
                reasons: vec!["current not available".to_string()],
            };
        }
    };

    if current_revision.reboot_requirements_unpopulated() && new.reboot_requirements_unpopulated() {
        return RebootDecision {
            required: new.reboot_required,
            method: RebootMethod::LegacyFallback,
            reasons: vec!["requirements not populated".to_string()],
        };
    }

    let file_changes = diff_files(&current_revision.files, &new.files);
    let unit_changes = diff_units(&current_revision.units, &new.units);

    let mut required = false;
    let mut reasons = Vec::new();

    for (label, changes, lookup_added, lookup_removed) in [(
        "file",
        &file_changes,
        &new.file_reboot_required,
        &current_revision.file_reboot_required,
    )] {
        collect_reasons(label, changes, lookup_added, lookup_removed, &mut required, &mut reasons);
    }
    for (label, changes, lookup_added, lookup_removed) in [(
        "unit",
        &unit_changes,
        &new.unit_reboot_required,
        &current_revision.unit_reboot_required,
    )] {
        collect_reasons(label, changes, lookup_added, lookup_removed, &mut required, &mut reasons);
    }

    RebootDecision {
        required,
        method: RebootMethod::DiffBased,
        reasons,
    }
}

fn collect_reasons(
    label: &str,
    changes: &[Change],
    lookup_added_or_modified: &std::collections::BTreeMap<String, bool>,
    lookup_removed: &std::collections::BTreeMap<String, bool>,
    required: &mut bool,
    reasons: &mut Vec<String>,
) {
    for change in changes {
        let flagged = match change.change_type {
            ChangeType::Added | ChangeType::Modified => {
                lookup_added_or_modified.get(&change.key).copied().unwrap_or(false)
            }
            ChangeType::Removed => lookup_removed.get(&change.key).copied().unwrap_or(false),
        };
        if flagged {
            *required = true;
            reasons.push(format!(
                "{label} {} ({}) requires reboot",
                change.key,
                change_label(change.change_type)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge;
    use crate::revision_builder::build_revision;
    use chrono::Utc;
    use mco_contracts::testing::InMemoryObjectStore;
    use mco_model::{FileSpec, Fragment, MachineConfigPool};

    fn pool() -> MachineConfigPool {
        MachineConfigPool::new("workers")
    }

    #[tokio::test]
    async fn first_apply_uses_legacy_flag() {
        let store = InMemoryObjectStore::new();
        let mut f = Fragment::new("f", 10);
        f.files.push(FileSpec::present("/etc/x", "v"));
        f.reboot_required = true;
        let merged = merge(&[f]);
        let built = build_revision(&store, &pool(), &merged).await.unwrap();

        let decision = decide(&store, None, &built.revision).await;
        assert!(decision.required);
        assert_eq!(decision.method, RebootMethod::LegacyFirstApply);
    }

    #[tokio::test]
    async fn same_revision_never_requires_reboot() {
        let store = InMemoryObjectStore::new();
        let mut f = Fragment::new("f", 10);
        f.files.push(FileSpec::present("/etc/x", "v"));
        let merged = merge(&[f]);
        let built = build_revision(&store, &pool(), &merged).await.unwrap();

        let decision = decide(&store, Some(&built.revision.name), &built.revision).await;
        assert!(!decision.required);
        assert_eq!(decision.method, RebootMethod::SameRevision);
    }

    #[tokio::test]
    async fn unrelated_change_without_reboot_flag_does_not_require_reboot() {
        let store = InMemoryObjectStore::new();
        let mut f1 = Fragment::new("f1", 10);
        f1.files.push(FileSpec::present("/etc/a", "v1"));
        let merged1 = merge(&[f1.clone()]);
        let built1 = build_revision(&store, &pool(), &merged1).await.unwrap();

        let mut f2 = f1.clone();
        f2.files[0].content = Some("v2".to_string());
        let merged2 = merge(&[f2]);
        let built2 = build_revision(&store, &pool(), &merged2).await.unwrap();

        let decision = decide(&store, Some(&built1.revision.name), &built2.revision).await;
        assert!(!decision.required);
        assert_eq!(decision.method, RebootMethod::DiffBased);
    }

    #[tokio::test]
    async fn changed_item_flagged_reboot_required_triggers_diff_based_reboot() {
        let store = InMemoryObjectStore::new();
        let mut f1 = Fragment::new("f1", 10);
        f1.files.push(FileSpec::present("/etc/a", "v1"));
        let merged1 = merge(&[f1.clone()]);
        let built1 = build_revision(&store, &pool(), &merged1).await.unwrap();

        let mut f2 = f1.clone();
        f2.files[0].content = Some("v2".to_string());
        f2.reboot_required = true;
        let merged2 = merge(&[f2]);
        let built2 = build_revision(&store, &pool(), &merged2).await.unwrap();

        let decision = decide(&store, Some(&built1.revision.name), &built2.revision).await;
        assert!(decision.required);
        assert_eq!(decision.method, RebootMethod::DiffBased);
        assert!(decision.reasons.iter().any(|r| r.contains("/etc/a")));
    }

    #[tokio::test]
    async fn missing_current_falls_back_to_legacy_flag() {
        let store = InMemoryObjectStore::new();
        let mut f = Fragment::new("f", 10);
        f.files.push(FileSpec::present("/etc/a", "v"));
        f.reboot_required = true;
        let merged = merge(&[f]);
        let built = build_revision(&store, &pool(), &merged).await.unwrap();

        let decision = decide(&store, Some("workers-does-not-exist"), &built.revision).await;
        assert!(decision.required);
        assert_eq!(decision.method, RebootMethod::LegacyFallback);
        let _ = Utc::now();
    }
}
