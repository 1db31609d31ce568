//! C1 — Validator. Pure; rejects forbidden paths/units, enforces size caps,
//! checks suffixes. Called during render (pre-merge) and again as a safety
//! net post-merge (`mco-core::render::render_pool`).

use mco_model::fragment::{
    ALLOWED_UNIT_SUFFIXES, FORBIDDEN_UNIT_NAMES, MAX_FILE_CONTENT_BYTES, MAX_PRIORITY,
};
use mco_model::{FileState, Fragment, ModelError};

/// Path prefixes this operator must never write under, regardless of the
/// fragment author's intent.
pub const FORBIDDEN_PATH_PREFIXES: &[&str] = &[
    "/usr/bin",
    "/usr/sbin",
    "/bin",
    "/sbin",
    "/boot",
    "/proc",
    "/sys",
    "/dev",
    "/var/lib/containers",
    "/var/lib/docker",
    "/var/lib/kubelet",
];

fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() || !path.starts_with('/') {
        return Err("path must be absolute".to_string());
    }
    if path.contains("..") {
        return Err("path must not contain '..'".to_string());
    }
    if path.contains("//") {
        return Err("path must not contain '//'".to_string());
    }
    for prefix in FORBIDDEN_PATH_PREFIXES {
        if path == *prefix || path.starts_with(&format!("{prefix}/")) {
            return Err(format!("path under forbidden prefix {prefix}"));
        }
    }
    Ok(())
}

fn validate_unit_name(name: &str) -> Result<(), String> {
    if FORBIDDEN_UNIT_NAMES.contains(&name) {
        return Err(format!("unit {name} is managed outside this operator"));
    }
    if !ALLOWED_UNIT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return Err(format!(
            "unit name must end in one of {ALLOWED_UNIT_SUFFIXES:?}"
        ));
    }
    Ok(())
}

/// Validate one fragment, collecting every violation rather than
/// short-circuiting on the first, so an operator sees the whole problem at
/// once.
pub fn validate_fragment(index: usize, fragment: &Fragment) -> Result<(), Vec<ModelError>> {
    let mut errors = Vec::new();

    if fragment.priority > MAX_PRIORITY {
        errors.push(ModelError::Validation {
            index,
            field: "priority",
            message: format!("priority {} exceeds max {MAX_PRIORITY}", fragment.priority),
        });
    }

    for (fi, file) in fragment.files.iter().enumerate() {
        if let Err(message) = validate_path(&file.path) {
            errors.push(ModelError::Validation {
                index,
                field: "files[].path",
                message: format!("files[{fi}] {message}"),
            });
        }
        match file.state {
            FileState::Present => {
                match &file.content {
                    None => errors.push(ModelError::Validation {
                        index,
                        field: "files[].content",
                        message: format!("files[{fi}] state=present requires content"),
                    }),
                    Some(content) if content.len() > MAX_FILE_CONTENT_BYTES => {
                        errors.push(ModelError::Validation {
                            index,
                            field: "files[].content",
                            message: format!(
                                "files[{fi}] content {} bytes exceeds {MAX_FILE_CONTENT_BYTES}",
                                content.len()
                            ),
                        })
                    }
                    Some(_) => {}
                }
            }
            FileState::Absent => {
                // content, if present, is accepted but ignored.
            }
        }
    }

    for (ui, unit) in fragment.units.iter().enumerate() {
        if let Err(message) = validate_unit_name(&unit.name) {
            errors.push(ModelError::Validation {
                index,
                field: "units[].name",
                message: format!("units[{ui}] {message}"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a whole batch, returning the union of every fragment's errors
/// (still tagged with the fragment's index in the input slice).
pub fn validate_all(fragments: &[Fragment]) -> Result<(), Vec<ModelError>> {
    let mut errors = Vec::new();
    for (index, fragment) in fragments.iter().enumerate() {
        if let Err(mut fragment_errors) = validate_fragment(index, fragment) {
            errors.append(&mut fragment_errors);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_model::{FileSpec, UnitSpec};

    #[test]
    fn rejects_relative_and_traversal_paths() {
        assert!(validate_path("etc/foo").is_err());
        assert!(validate_path("/etc/../foo").is_err());
        assert!(validate_path("/etc//foo").is_err());
        assert!(validate_path("/usr/bin/evil").is_err());
        assert!(validate_path("/etc/mco-test/ok.conf").is_ok());
    }

    #[test]
    fn present_requires_content_absent_ignores_it() {
        let mut fragment = Fragment::new("f", 10);
        fragment.files.push(FileSpec {
            path: "/etc/x".into(),
            content: None,
            mode: 0o644,
            owner: "root:root".into(),
            state: FileState::Present,
        });
        assert!(validate_fragment(0, &fragment).is_err());

        let mut fragment = Fragment::new("f", 10);
        fragment.files.push(FileSpec {
            path: "/etc/x".into(),
            content: Some("ignored".into()),
            mode: 0o644,
            owner: "root:root".into(),
            state: FileState::Absent,
        });
        assert!(validate_fragment(0, &fragment).is_ok());
    }

    #[test]
    fn content_over_cap_rejected() {
        let mut fragment = Fragment::new("f", 10);
        fragment
            .files
            .push(FileSpec::present("/etc/big", "x".repeat(MAX_FILE_CONTENT_BYTES + 1)));
        assert!(validate_fragment(0, &fragment).is_err());
    }

    #[test]
    fn unit_suffix_and_forbidden_names() {
        let mut fragment = Fragment::new("f", 10);
        fragment.units.push(UnitSpec::new("kubelet.service"));
        assert!(validate_fragment(0, &fragment).is_err());

        let mut fragment = Fragment::new("f", 10);
        fragment.units.push(UnitSpec::new("not-a-unit"));
        assert!(validate_fragment(0, &fragment).is_err());

        let mut fragment = Fragment::new("f", 10);
        fragment.units.push(UnitSpec::new("app.service"));
        assert!(validate_fragment(0, &fragment).is_ok());
    }
}
