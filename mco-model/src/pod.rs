use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A pod running on a node, reduced to the fields the Drain Engine's
/// exclusion rules reason about. Standing in for the platform's pod object
/// the way `NodeObject` stands in for the platform's node object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// `true` when the pod tolerates every taint, including the
    /// unschedulable one this engine applies on cordon.
    #[serde(default)]
    pub tolerates_all_taints: bool,
    /// Owned by a node-local daemon manager (the platform's equivalent of a
    /// DaemonSet) — always exempt from eviction.
    #[serde(default)]
    pub daemon_owned: bool,
}

impl Pod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            tolerates_all_taints: false,
            daemon_owned: false,
        }
    }
}
