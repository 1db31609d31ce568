use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ANNOTATION_PREFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Applying,
    Done,
    Error,
    Rebooting,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Applying => "applying",
            AgentState::Done => "done",
            AgentState::Error => "error",
            AgentState::Rebooting => "rebooting",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(AgentState::Idle),
            "applying" => Some(AgentState::Applying),
            "done" => Some(AgentState::Done),
            "error" => Some(AgentState::Error),
            "rebooting" => Some(AgentState::Rebooting),
            _ => None,
        }
    }
}

/// Annotation key constants, namespaced under `mco.in-cloud.io/`.
pub mod keys {
    use super::ANNOTATION_PREFIX;

    macro_rules! key {
        ($name:ident, $suffix:literal) => {
            pub fn $name() -> String {
                format!("{}/{}", ANNOTATION_PREFIX, $suffix)
            }
        };
    }

    key!(pool, "pool");
    key!(desired_revision, "desired-revision");
    key!(current_revision, "current-revision");
    key!(agent_state, "agent-state");
    key!(last_error, "last-error");
    key!(reboot_pending, "reboot-pending");
    key!(force_reboot, "force-reboot");
    key!(paused, "paused");
    key!(cordoned, "cordoned");
    key!(drain_started_at, "drain-started-at");
    key!(drain_retry_count, "drain-retry-count");
}

/// Typed view over the raw string-keyed annotation map described in
/// `spec.md` §3, so internal code never manipulates string keys by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAnnotations {
    pub pool: Option<String>,
    pub desired_revision: Option<String>,
    pub current_revision: Option<String>,
    pub agent_state: Option<AgentState>,
    pub last_error: Option<String>,
    pub reboot_pending: bool,
    pub force_reboot: bool,
    pub paused: bool,
    pub cordoned: bool,
    pub drain_started_at: Option<DateTime<Utc>>,
    pub drain_retry_count: Option<u32>,
}

fn is_true(map: &BTreeMap<String, String>, key: &str) -> bool {
    map.get(key).map(|v| v == "true").unwrap_or(false)
}

impl NodeAnnotations {
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        Self {
            pool: map.get(&keys::pool()).cloned(),
            desired_revision: map.get(&keys::desired_revision()).cloned(),
            current_revision: map.get(&keys::current_revision()).cloned(),
            agent_state: map
                .get(&keys::agent_state())
                .and_then(|v| AgentState::parse(v)),
            last_error: map.get(&keys::last_error()).cloned(),
            reboot_pending: is_true(map, &keys::reboot_pending()),
            force_reboot: is_true(map, &keys::force_reboot()),
            paused: is_true(map, &keys::paused()),
            cordoned: is_true(map, &keys::cordoned()),
            drain_started_at: map
                .get(&keys::drain_started_at())
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            drain_retry_count: map
                .get(&keys::drain_retry_count())
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Node is "quiescent" per the §3 invariant: desired==current, agent
    /// state is `done`/`idle`, no drain/reboot annotations outstanding.
    pub fn is_quiescent(&self) -> bool {
        self.desired_revision.is_some()
            && self.desired_revision == self.current_revision
            && matches!(self.agent_state, Some(AgentState::Done) | Some(AgentState::Idle))
            && !self.cordoned
            && !self.reboot_pending
            && self.drain_started_at.is_none()
    }
}

/// A single key/value or key/null entry for a JSON merge patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue {
    Set(String),
    Clear,
}

/// Builder for `{"metadata":{"annotations": {...}}}` merge patches (C11).
#[derive(Debug, Clone, Default)]
pub struct AnnotationPatch {
    pub entries: BTreeMap<String, PatchValue>,
}

impl AnnotationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: String, value: impl Into<String>) -> Self {
        self.entries.insert(key, PatchValue::Set(value.into()));
        self
    }

    pub fn clear(mut self, key: String) -> Self {
        self.entries.insert(key, PatchValue::Clear);
        self
    }

    /// Render as the JSON merge-patch body described in §4.10.
    pub fn to_json(&self) -> serde_json::Value {
        let mut annotations = serde_json::Map::new();
        for (k, v) in &self.entries {
            let value = match v {
                PatchValue::Set(s) => serde_json::Value::String(s.clone()),
                PatchValue::Clear => serde_json::Value::Null,
            };
            annotations.insert(k.clone(), value);
        }
        serde_json::json!({ "metadata": { "annotations": serde_json::Value::Object(annotations) } })
    }
}

/// The platform's node object, reduced to the fields this engine reads and
/// writes: a name, the raw annotation map it owns by convention (patch
/// writes always merge, never replace), a set of labels used by node
/// selectors, and the schedulability bit cordon/uncordon flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeObject {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub unschedulable: bool,
}

impl NodeObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            unschedulable: false,
        }
    }

    pub fn typed_annotations(&self) -> NodeAnnotations {
        NodeAnnotations::from_map(&self.annotations)
    }

    pub fn matches_selector(&self, selector: &[(String, String)]) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).map(|lv| lv == v).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiescence_requires_matching_revisions_and_clean_annotations() {
        let mut map = BTreeMap::new();
        map.insert(keys::desired_revision(), "workers-abc1234567".into());
        map.insert(keys::current_revision(), "workers-abc1234567".into());
        map.insert(keys::agent_state(), "done".into());
        let ann = NodeAnnotations::from_map(&map);
        assert!(ann.is_quiescent());

        map.insert(keys::reboot_pending(), "true".into());
        let ann = NodeAnnotations::from_map(&map);
        assert!(!ann.is_quiescent());
    }

    #[test]
    fn patch_renders_set_and_clear() {
        let patch = AnnotationPatch::new()
            .set(keys::agent_state(), "done")
            .clear(keys::last_error());
        let json = patch.to_json();
        let anns = &json["metadata"]["annotations"];
        assert_eq!(anns[keys::agent_state()], "done");
        assert!(anns[keys::last_error()].is_null());
    }
}
