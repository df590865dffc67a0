//! Wire representations exchanged with the hashstorage server
//!
//! Everything on the wire is JSON, matching the server's BlockJson
//! interchange. Field names here are the protocol, not a style choice.

use serde::{Deserialize, Serialize};

/// Response of `GET /version`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Response of `GET /groups/{public_key}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupsJson {
    pub groups: Vec<String>,
}

/// Response of `GET /keys/{public_key}/{group}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeysJson {
    pub keys: Vec<String>,
}

/// Block metadata without the payload, as returned by the info endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockInfoJson {
    pub public: String,
    pub group: String,
    pub key: String,
    pub version: u64,
}

/// A full block representation: the unit of storage on the wire.
///
/// `version` is server-assigned; on a write request it is the client's
/// candidate (current confirmed version + 1). `signature` is the hex
/// Ed25519 signature binding (public, group, key, version, data) to the
/// owner's secret key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockJson {
    pub public: String,
    pub group: String,
    pub key: String,
    pub version: u64,
    pub data: String,
    pub signature: String,
}

/// Body the server sends with a 409 on a lost compare-and-swap race.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConflictJson {
    pub version: u64,
}

/// Body of `POST /data/{public_key}/{group}/{key}`; owner, group and key
/// travel in the URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputJson {
    pub version: u64,
    pub data: String,
    pub signature: String,
}

impl BlockJson {
    /// Split a block into the write-request body; the addressing triple is
    /// carried by the URL.
    pub fn to_input(&self) -> InputJson {
        InputJson {
            version: self.version,
            data: self.data.clone(),
            signature: self.signature.clone(),
        }
    }

    pub fn info(&self) -> BlockInfoJson {
        BlockInfoJson {
            public: self.public.clone(),
            group: self.group.clone(),
            key: self.key.clone(),
            version: self.version,
        }
    }
}
