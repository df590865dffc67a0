//! Local version guard
//!
//! Records the highest block version this client has seen, keyed by a hash
//! of (owner, group, key), in the local store. `check` then detects stale
//! reads: a block whose version is below the recorded high-water mark came
//! from an out-of-date server or a rolled-back cache.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::block::{Block, BlockVersion};
use crate::local::{LocalStore, StoreError};

const GUARD_PREFIX_DEFAULT: &str = "hsguard";

pub struct VersionGuard<'a> {
    prefix: String,
    store: &'a dyn LocalStore,
}

impl<'a> VersionGuard<'a> {
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self {
            prefix: GUARD_PREFIX_DEFAULT.to_string(),
            store,
        }
    }

    /// Record a block's confirmed version if it is the highest seen so far.
    /// Unsaved blocks have nothing to record.
    pub fn record(&self, block: &Block) -> Result<(), StoreError> {
        let BlockVersion::Saved(version) = block.version() else {
            return Ok(());
        };

        let slot = self.slot_key(block);
        let recorded = self.recorded_version(&slot)?;
        if recorded.map_or(true, |r| version > r) {
            self.store.set(&slot, &version.to_string())?;
        }
        Ok(())
    }

    /// `false` iff a strictly higher version of this block was already
    /// recorded — i.e. the given state is stale. Blocks never seen before
    /// (and unsaved ones) pass.
    pub fn check(&self, block: &Block) -> Result<bool, StoreError> {
        let BlockVersion::Saved(version) = block.version() else {
            return Ok(true);
        };

        let slot = self.slot_key(block);
        Ok(match self.recorded_version(&slot)? {
            Some(recorded) => version >= recorded,
            None => true,
        })
    }

    fn recorded_version(&self, slot: &str) -> Result<Option<u64>, StoreError> {
        match self.store.get(slot)? {
            Some(raw) => raw
                .parse::<u64>()
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("guard record: {}", e))),
            None => Ok(None),
        }
    }

    fn slot_key(&self, block: &Block) -> String {
        let hash = Self::address_hash(block.public_key(), block.group(), block.key());
        format!("{}-{}", self.prefix, hash)
    }

    fn address_hash(public_key: &str, group: &str, key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        public_key.hash(&mut hasher);
        group.hash(&mut hasher);
        key.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryApi;
    use crate::identity::Identity;
    use crate::local::MemoryStore;

    async fn saved_block(api: &MemoryApi, id: &Identity, versions: u64) -> Block {
        let mut block = Block::create(&id.public_key(), "mygroup", "mykey");
        for v in 1..=versions {
            block.set_data(&format!("payload {}", v));
            block.save(api, id).await.unwrap();
        }
        block
    }

    #[test]
    fn test_address_hash_is_stable_per_triple() {
        let h1 = VersionGuard::address_hash("pk", "g", "k");
        let h2 = VersionGuard::address_hash("pk", "g", "k");
        let h3 = VersionGuard::address_hash("pk", "g", "k2");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_unsaved_block_passes_and_records_nothing() {
        let store = MemoryStore::new();
        let guard = VersionGuard::new(&store);
        let block = Block::create("pk", "g", "k");

        guard.record(&block).unwrap();
        assert!(guard.check(&block).unwrap());
    }

    #[tokio::test]
    async fn test_stale_version_fails_check() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        let store = MemoryStore::new();
        let guard = VersionGuard::new(&store);

        let v1 = saved_block(&api, &id, 1).await;
        // Same address, advanced further against a fresh server
        let v3 = saved_block(&MemoryApi::new(), &id, 3).await;

        guard.record(&v3).unwrap();
        assert!(guard.check(&v3).unwrap());
        assert!(!guard.check(&v1).unwrap());

        // Recording an older state must not lower the high-water mark
        guard.record(&v1).unwrap();
        assert!(!guard.check(&v1).unwrap());
        assert!(guard.check(&v3).unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_surfaced() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        let store = MemoryStore::new();
        let guard = VersionGuard::new(&store);

        let block = saved_block(&api, &id, 1).await;
        let slot = guard.slot_key(&block);
        store.set(&slot, "not a number").unwrap();

        assert!(matches!(guard.check(&block), Err(StoreError::Corrupt(_))));
    }
}
