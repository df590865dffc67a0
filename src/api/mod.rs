//! Transport to the hashstorage server
//!
//! `StorageApi` is the seam between the block/identity layer and the wire:
//! `HttpApi` speaks the server's HTTP surface, `MemoryApi` is an in-process
//! server with the same contract for tests and offline runs.
//!
//! The transport interprets no business semantics and performs no retries.
//! Every call is a single round trip; retry policy belongs to the caller.

pub mod http;
pub mod memory;
pub mod types;

pub use http::HttpApi;
pub use memory::MemoryApi;
pub use types::{BlockInfoJson, BlockJson, ConflictJson, GroupsJson, InputJson, KeysJson, VersionInfo};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server was unreachable, the connection dropped, or the call
    /// timed out. Distinct from every semantic failure below.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    /// The write lost an optimistic-concurrency race. Carries the server's
    /// current version so the caller can re-fetch and retry.
    #[error("Version conflict: server is at version {current}")]
    VersionConflict { current: u64 },

    /// The response body did not decode into the expected shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unexpected server status: {0}")]
    UnexpectedStatus(u16),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Malformed(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// The hashstorage server's request/response surface.
///
/// All operations suspend for exactly one round trip. Implementations must
/// map failures onto `ApiError` and never swallow them.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Server protocol/version identifier, for compatibility checks.
    async fn server_version(&self) -> Result<VersionInfo, ApiError>;

    /// Group names owned by a public key.
    async fn list_groups(&self, public_key: &str) -> Result<Vec<String>, ApiError>;

    /// Block keys within one group of an owner.
    async fn list_keys(&self, public_key: &str, group: &str) -> Result<Vec<String>, ApiError>;

    /// Block metadata (no payload) for one (owner, group, key).
    async fn block_info(
        &self,
        public_key: &str,
        group: &str,
        key: &str,
    ) -> Result<BlockInfoJson, ApiError>;

    /// Full current block state for one (owner, group, key).
    async fn get_block(
        &self,
        public_key: &str,
        group: &str,
        key: &str,
    ) -> Result<BlockJson, ApiError>;

    /// Create or update a block. The server enforces compare-and-swap on
    /// the version: the write is accepted only if `block.version` is exactly
    /// one past the server's current state (or 1 for a first create), and
    /// only if the signature verifies against the owner key. Returns the
    /// confirmed representation.
    async fn put_block(&self, block: BlockJson) -> Result<BlockJson, ApiError>;
}
