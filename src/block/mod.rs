//! Versioned blocks and the save protocol
//!
//! A `Block` is the unit of remote storage: opaque payload addressed by
//! (owner public key, group, key), versioned by the server. `Block::save`
//! runs the optimistic-concurrency protocol: sign the candidate state,
//! submit it, and adopt the server-confirmed representation — or surface
//! `SaveError::Conflict` and leave the block untouched for the caller to
//! re-fetch and retry. No merge is ever attempted here.

use thiserror::Error;

use crate::api::{ApiError, BlockJson, StorageApi};
use crate::identity::{Identity, IdentityError};

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Malformed block representation: {0}")]
    MalformedRepresentation(String),

    #[error("Block signature does not verify against its owner key")]
    BadSignature,
}

#[derive(Error, Debug)]
pub enum SaveError {
    /// The identity passed to `save` does not own this block.
    #[error("Identity {identity} does not own block of {owner}")]
    WrongOwner { owner: String, identity: String },

    /// Lost the compare-and-swap race. The block is unchanged; re-fetch,
    /// reapply the mutation, and save again.
    #[error("Version conflict: server is at version {current}")]
    Conflict { current: u64 },

    /// The server confirmed a write the client cannot reconcile, e.g. a
    /// version that is not the candidate it submitted.
    #[error("Server confirmed unexpected state: {0}")]
    UnexpectedConfirmation(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Api(ApiError),
}

impl From<ApiError> for SaveError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::VersionConflict { current } => SaveError::Conflict { current },
            other => SaveError::Api(other),
        }
    }
}

/// Version state of a block. A block that has never been confirmed by the
/// server is `Unsaved`; a confirmed block carries the server-assigned
/// version. Keeping this a two-state enum (rather than a magic integer)
/// makes the create path and the update path impossible to mix up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockVersion {
    Unsaved,
    Saved(u64),
}

impl BlockVersion {
    /// The candidate version the next save will claim.
    pub fn next(self) -> u64 {
        match self {
            BlockVersion::Unsaved => 1,
            BlockVersion::Saved(v) => v + 1,
        }
    }

    pub fn confirmed(self) -> Option<u64> {
        match self {
            BlockVersion::Unsaved => None,
            BlockVersion::Saved(v) => Some(v),
        }
    }
}

/// A versioned unit of remote storage.
///
/// `save` reads and then writes the local version, so calls on one
/// instance must be serialized; `&mut self` enforces that for a single
/// owner. Concurrent saves from different clients are arbitrated solely
/// by the server's version check.
#[derive(Clone, Debug)]
pub struct Block {
    public: String,
    group: String,
    key: String,
    version: BlockVersion,
    data: String,
    /// Signature of the last server-confirmed state. Empty until the first
    /// successful save, cleared again by local mutation.
    signature: String,
    dirty: bool,
}

impl Block {
    /// A fresh, never-saved block with an empty payload.
    pub fn create(public_key: &str, group: &str, key: &str) -> Self {
        Self {
            public: public_key.to_string(),
            group: group.to_string(),
            key: key.to_string(),
            version: BlockVersion::Unsaved,
            data: String::new(),
            signature: String::new(),
            dirty: false,
        }
    }

    /// Reconstruct a block from a server representation. The result is the
    /// baseline for the next update: its version is the server's current
    /// version and its payload is clean.
    pub fn from_block_json(json: &BlockJson) -> Result<Self, BlockError> {
        if json.public.is_empty() || json.group.is_empty() || json.key.is_empty() {
            return Err(BlockError::MalformedRepresentation(
                "empty owner, group or key".to_string(),
            ));
        }
        if json.version == 0 {
            return Err(BlockError::MalformedRepresentation(
                "server representation carries version 0".to_string(),
            ));
        }

        if !Identity::verify_block_signature(
            &json.public,
            &json.group,
            &json.key,
            json.version,
            &json.data,
            &json.signature,
        ) {
            return Err(BlockError::BadSignature);
        }

        Ok(Self {
            public: json.public.clone(),
            group: json.group.clone(),
            key: json.key.clone(),
            version: BlockVersion::Saved(json.version),
            data: json.data.clone(),
            signature: json.signature.clone(),
            dirty: false,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last server-confirmed version state.
    pub fn version(&self) -> BlockVersion {
        self.version
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Whether the payload has local changes the server has not confirmed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the payload. Does not touch the confirmed version; the
    /// stale signature is dropped because it no longer covers the data.
    pub fn set_data(&mut self, data: &str) {
        self.data = data.to_string();
        self.signature = String::new();
        self.dirty = true;
    }

    /// Persist this block's state to the server.
    ///
    /// Signs the candidate (version + 1) state with `identity` and submits
    /// it. On success the block adopts the confirmed representation and
    /// returns the new version. On `Conflict` — some other client got there
    /// first — the block is left exactly as it was.
    ///
    /// Saving a clean, already-confirmed block skips the round trip and
    /// returns the current version.
    pub async fn save(
        &mut self,
        api: &dyn StorageApi,
        identity: &Identity,
    ) -> Result<u64, SaveError> {
        if identity.public_key() != self.public {
            return Err(SaveError::WrongOwner {
                owner: self.public.clone(),
                identity: identity.public_key(),
            });
        }

        // Unchanged since the last confirmation: nothing to send.
        if !self.dirty {
            if let BlockVersion::Saved(v) = self.version {
                return Ok(v);
            }
        }

        let candidate = self.version.next();
        let signature = identity.sign_block(&self.group, &self.key, candidate, &self.data)?;

        let submitted = BlockJson {
            public: self.public.clone(),
            group: self.group.clone(),
            key: self.key.clone(),
            version: candidate,
            data: self.data.clone(),
            signature,
        };

        let confirmed = api.put_block(submitted).await?;
        if confirmed.version != candidate {
            return Err(SaveError::UnexpectedConfirmation(format!(
                "submitted version {}, server confirmed {}",
                candidate, confirmed.version
            )));
        }

        log::debug!(
            "Saved block {}/{} at version {}",
            self.group,
            self.key,
            confirmed.version
        );

        self.version = BlockVersion::Saved(confirmed.version);
        self.data = confirmed.data;
        self.signature = confirmed.signature;
        self.dirty = false;
        Ok(candidate)
    }

    /// Fetch the server's current state of this block's address and return
    /// it as a fresh baseline. The receiver is untouched; after a conflict
    /// the caller decides what to reapply onto the result.
    pub async fn refetch(&self, api: &dyn StorageApi) -> Result<Block, RefetchError> {
        let json = api.get_block(&self.public, &self.group, &self.key).await?;
        Ok(Block::from_block_json(&json)?)
    }
}

#[derive(Error, Debug)]
pub enum RefetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Block(#[from] BlockError),
}
