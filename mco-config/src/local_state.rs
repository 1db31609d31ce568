//! Seeds an `InMemoryObjectStore` from a single YAML document on disk.
//!
//! There is no live cluster in this repository and no cluster-client crate
//! in the teacher's dependency stack, so the shipped `ObjectStore` backend
//! for both binaries is this local-state loader rather than a fabricated
//! Kubernetes client. A real deployment swaps this file out for a
//! cluster-backed `ObjectStore` impl without touching `mco-core`/
//! `mco-contracts`. Shared by `mco-agent` (one node's slice of state) and
//! `mco-controller` (the whole pool/fragment/node set).

use std::collections::BTreeMap;
use std::path::Path;

use mco_contracts::testing::{InMemoryObjectStore, InMemoryPodManager};
use mco_model::{Fragment, MachineConfigPool, NodeObject, Pod};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalStateError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
pub struct LocalStateDocument {
    #[serde(default)]
    pub pools: Vec<MachineConfigPool>,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    #[serde(default)]
    pub nodes: Vec<NodeObject>,
    /// Pods keyed by the node they run on — only the controller's drain
    /// engine reads this; the agent's document omits it.
    #[serde(default)]
    pub pods_by_node: BTreeMap<String, Vec<Pod>>,
}

pub async fn load(path: impl AsRef<Path>) -> Result<LocalStateDocument, LocalStateError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LocalStateError::Io {
            path: path.display().to_string(),
            source,
        })?;
    serde_yaml::from_str(&raw).map_err(|source| LocalStateError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn seed(store: &InMemoryObjectStore, doc: LocalStateDocument) {
    for pool in doc.pools {
        store.seed_pool(pool);
    }
    for fragment in doc.fragments {
        store.seed_fragment(fragment);
    }
    for node in doc.nodes {
        store.seed_node(node);
    }
}

pub fn seed_pods(pods: &InMemoryPodManager, doc: &LocalStateDocument) {
    for (node_name, node_pods) in &doc.pods_by_node {
        for pod in node_pods {
            pods.seed_pod(node_name, pod.clone());
        }
    }
}
