//! In-process hashstorage server
//!
//! Implements the authoritative server rules — signature verification and
//! the compare-and-swap version check — entirely in memory. Used for
//! integration testing without a running server, the same way other
//! transports here get a simulated backend.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::identity::Identity;

use super::types::{BlockInfoJson, BlockJson, VersionInfo};
use super::{ApiError, StorageApi};

const MEMORY_SERVER_VERSION: &str = "hashstorage-memory/0.1";

type BlockAddress = (String, String, String);

/// A shared in-memory server. Clones share the same block table, so two
/// clients built from clones of one `MemoryApi` race against each other
/// exactly as two processes race against a real server.
#[derive(Clone, Default)]
pub struct MemoryApi {
    blocks: Arc<Mutex<HashMap<BlockAddress, BlockJson>>>,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn address(block: &BlockJson) -> BlockAddress {
        (
            block.public.clone(),
            block.group.clone(),
            block.key.clone(),
        )
    }
}

#[async_trait]
impl StorageApi for MemoryApi {
    async fn server_version(&self) -> Result<VersionInfo, ApiError> {
        Ok(VersionInfo {
            version: MEMORY_SERVER_VERSION.to_string(),
        })
    }

    async fn list_groups(&self, public_key: &str) -> Result<Vec<String>, ApiError> {
        let blocks = self.blocks.lock().await;
        let groups: BTreeSet<String> = blocks
            .keys()
            .filter(|(public, _, _)| public == public_key)
            .map(|(_, group, _)| group.clone())
            .collect();
        Ok(groups.into_iter().collect())
    }

    async fn list_keys(&self, public_key: &str, group: &str) -> Result<Vec<String>, ApiError> {
        let blocks = self.blocks.lock().await;
        let keys: BTreeSet<String> = blocks
            .keys()
            .filter(|(public, g, _)| public == public_key && g == group)
            .map(|(_, _, key)| key.clone())
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn block_info(
        &self,
        public_key: &str,
        group: &str,
        key: &str,
    ) -> Result<BlockInfoJson, ApiError> {
        let blocks = self.blocks.lock().await;
        blocks
            .get(&(
                public_key.to_string(),
                group.to_string(),
                key.to_string(),
            ))
            .map(|b| b.info())
            .ok_or(ApiError::NotFound)
    }

    async fn get_block(
        &self,
        public_key: &str,
        group: &str,
        key: &str,
    ) -> Result<BlockJson, ApiError> {
        let blocks = self.blocks.lock().await;
        blocks
            .get(&(
                public_key.to_string(),
                group.to_string(),
                key.to_string(),
            ))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn put_block(&self, block: BlockJson) -> Result<BlockJson, ApiError> {
        // A write that does not verify against the claimed owner key is
        // rejected before the version check, as the real server does.
        if !Identity::verify_block_signature(
            &block.public,
            &block.group,
            &block.key,
            block.version,
            &block.data,
            &block.signature,
        ) {
            return Err(ApiError::Unauthorized);
        }

        let mut blocks = self.blocks.lock().await;
        let address = Self::address(&block);

        match blocks.get(&address) {
            Some(current) => {
                if block.version != current.version + 1 {
                    log::debug!(
                        "CAS reject for {}/{}: candidate {} vs current {}",
                        block.group,
                        block.key,
                        block.version,
                        current.version
                    );
                    return Err(ApiError::VersionConflict {
                        current: current.version,
                    });
                }
            }
            None => {
                // Create path: only the very first version may land.
                if block.version != 1 {
                    return Err(ApiError::VersionConflict { current: 0 });
                }
            }
        }

        blocks.insert(address, block.clone());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_block(id: &Identity, group: &str, key: &str, version: u64, data: &str) -> BlockJson {
        BlockJson {
            public: id.public_key(),
            group: group.to_string(),
            key: key.to_string(),
            version,
            data: data.to_string(),
            signature: id.sign_block(group, key, version, data).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();

        let block = signed_block(&id, "mygroup", "mykey", 1, "Hello world");
        api.put_block(block).await.unwrap();

        let fetched = api
            .get_block(&id.public_key(), "mygroup", "mykey")
            .await
            .unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.data, "Hello world");

        let info = api
            .block_info(&id.public_key(), "mygroup", "mykey")
            .await
            .unwrap();
        assert_eq!(info.version, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        assert!(matches!(
            api.get_block(&id.public_key(), "g", "k").await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_unsigned_write_is_unauthorized() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();

        let mut block = signed_block(&id, "g", "k", 1, "data");
        block.signature = String::new();
        assert!(matches!(
            api.put_block(block).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_foreign_signature_is_unauthorized() {
        let api = MemoryApi::new();
        let owner = Identity::derive("app1", "alex", "Qwerty123").unwrap();
        let intruder = Identity::derive("app1", "eve", "Hunter2!").unwrap();

        // Signed by the wrong key for the claimed owner address
        let mut block = signed_block(&intruder, "g", "k", 1, "data");
        block.public = owner.public_key();
        assert!(matches!(
            api.put_block(block).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_candidate() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();

        api.put_block(signed_block(&id, "g", "k", 1, "v1"))
            .await
            .unwrap();
        api.put_block(signed_block(&id, "g", "k", 2, "v2"))
            .await
            .unwrap();

        // A second candidate 2 lost the race against the write above
        let stale = signed_block(&id, "g", "k", 2, "other");
        match api.put_block(stale).await {
            Err(ApiError::VersionConflict { current }) => assert_eq!(current, 2),
            other => panic!("expected VersionConflict, got {:?}", other.map(|b| b.version)),
        }
    }

    #[tokio::test]
    async fn test_create_requires_version_one() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();

        let jump = signed_block(&id, "g", "k", 3, "data");
        assert!(matches!(
            api.put_block(jump).await,
            Err(ApiError::VersionConflict { current: 0 })
        ));
    }

    #[tokio::test]
    async fn test_listings() {
        let api = MemoryApi::new();
        let id = Identity::derive("app1", "alex", "Qwerty123").unwrap();

        api.put_block(signed_block(&id, "beta", "k1", 1, "a"))
            .await
            .unwrap();
        api.put_block(signed_block(&id, "alpha", "k1", 1, "b"))
            .await
            .unwrap();
        api.put_block(signed_block(&id, "alpha", "k2", 1, "c"))
            .await
            .unwrap();

        assert_eq!(
            api.list_groups(&id.public_key()).await.unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert_eq!(
            api.list_keys(&id.public_key(), "alpha").await.unwrap(),
            vec!["k1".to_string(), "k2".to_string()]
        );
        assert!(api.list_groups("another-key").await.unwrap().is_empty());
    }
}
