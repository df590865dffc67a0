//! Cryptographic identity for hashstorage users
//!
//! An `Identity` is an Ed25519 keypair derived deterministically from
//! (application id, username, password). The public key addresses the user's
//! blocks on the server; the secret key signs every block write. Deriving
//! twice from the same credentials yields the same keypair, so the server
//! never needs to store key material.

pub mod profile;

pub use profile::Identity;

use thiserror::Error;

use crate::local::StoreError;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid credentials: application id, username and password must be non-empty")]
    InvalidCredentials,

    #[error("No identity persisted in the local slot")]
    NotFound,

    #[error("Persisted identity is corrupt: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),
}
