//! C7 — Revision Cache. A small TTL cache in front of `ObjectStore::get_revision`
//! so a flapping watch stream doesn't refetch the same immutable revision on
//! every reconnect.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mco_contracts::object_store::{ObjectStore, StoreResult};
use mco_model::RenderedRevision;
use parking_lot::RwLock;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct Entry {
    revision: RenderedRevision,
    fetched_at: Instant,
}

/// Revisions are immutable once created, so a cache hit never needs
/// invalidation beyond the TTL — the TTL exists only to eventually drop
/// references to revisions this agent no longer needs (deleted upstream
/// during retention sweeps).
pub struct RevisionCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl RevisionCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, store: &dyn ObjectStore, name: &str) -> StoreResult<RenderedRevision> {
        if let Some(entry) = self.entries.read().get(name) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.revision.clone());
            }
        }

        let revision = store.get_revision(name).await?;
        self.entries.write().insert(
            name.to_string(),
            Entry {
                revision: revision.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(revision)
    }

    pub fn invalidate(&self, name: &str) {
        self.entries.write().remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RevisionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_contracts::testing::InMemoryObjectStore;
    use mco_core::merge::merge;
    use mco_core::revision_builder::build_revision;
    use mco_model::{Fragment, MachineConfigPool};

    #[tokio::test]
    async fn repeated_get_within_ttl_hits_the_cache() {
        let store = InMemoryObjectStore::new();
        let mut f = Fragment::new("f", 10);
        f.files.push(mco_model::FileSpec::present("/etc/x", "v"));
        let merged = merge(&[f]);
        let built = build_revision(&store, &MachineConfigPool::new("workers"), &merged)
            .await
            .unwrap();

        let cache = RevisionCache::new();
        let first = cache.get(&store, &built.revision.name).await.unwrap();
        store.delete_revision(&built.revision.name).await.unwrap();
        let second = cache.get(&store, &built.revision.name).await.unwrap();
        assert_eq!(first.name, second.name);
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let store = InMemoryObjectStore::new();
        let mut f = Fragment::new("f", 10);
        f.files.push(mco_model::FileSpec::present("/etc/x", "v"));
        let merged = merge(&[f]);
        let built = build_revision(&store, &MachineConfigPool::new("workers"), &merged)
            .await
            .unwrap();

        let cache = RevisionCache::with_ttl(Duration::from_millis(1));
        cache.get(&store, &built.revision.name).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.delete_revision(&built.revision.name).await.unwrap();
        let result = cache.get(&store, &built.revision.name).await;
        assert!(
            result.is_err(),
            "expired entry must be refetched from the store"
        );
    }
}
