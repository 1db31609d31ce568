use serde::{Deserialize, Serialize};

/// Maximum content size accepted for a single file spec (1 MiB).
pub const MAX_FILE_CONTENT_BYTES: usize = 1024 * 1024;

/// Desired presence state for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Present,
    Absent,
}

/// Desired activation state for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Started,
    Stopped,
    Restarted,
    Reloaded,
}

/// Tri-state flag: unset (no opinion), or an explicit true/false.
///
/// Kept distinct from `Option<bool>` in signatures that need to emphasize
/// the "operator expressed no opinion" branch, but `Option<bool>` is the
/// wire representation (absent key == unset).
pub type Tristate = Option<bool>;

/// A single desired file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default = "default_owner")]
    pub owner: String,
    pub state: FileState,
}

fn default_mode() -> u32 {
    0o644
}

fn default_owner() -> String {
    "root:root".to_string()
}

impl FileSpec {
    pub fn present(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            mode: default_mode(),
            owner: default_owner(),
            state: FileState::Present,
        }
    }

    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            mode: default_mode(),
            owner: default_owner(),
            state: FileState::Absent,
        }
    }
}

/// Suffixes accepted for unit names (systemd unit types this operator is
/// allowed to manage).
pub const ALLOWED_UNIT_SUFFIXES: &[&str] =
    &[".service", ".timer", ".socket", ".mount", ".target"];

/// Unit names this operator must never touch regardless of suffix.
pub const FORBIDDEN_UNIT_NAMES: &[&str] = &[
    "kubelet.service",
    "crio.service",
    "containerd.service",
    "docker.service",
];

/// A single desired systemd-style unit state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Tristate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<UnitState>,
    #[serde(default)]
    pub mask: bool,
}

impl UnitSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: None,
            state: None,
            mask: false,
        }
    }
}

/// An operator-authored configuration fragment: a named, prioritized bundle
/// of file and unit specs, optionally flagged as reboot-requiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    #[serde(default)]
    pub pool_labels: Vec<(String, String)>,
    pub priority: u32,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub units: Vec<UnitSpec>,
    #[serde(default)]
    pub reboot_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot_reason: Option<String>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            pool_labels: Vec::new(),
            priority,
            files: Vec::new(),
            units: Vec::new(),
            reboot_required: false,
            reboot_reason: None,
        }
    }
}

/// Maximum allowed priority value (inclusive).
pub const MAX_PRIORITY: u32 = 1000;
