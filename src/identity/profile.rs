//! Identity derivation, block signing, and the persisted identity slot

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::local::LocalStore;

use super::IdentityError;

/// Key under which the serialized identity lives in the local store.
const IDENTITY_SLOT_KEY: &str = "hsIdentity";

/// Serializable form of an Identity (for the local slot).
/// The secret key is stored as hex. Zeroized on drop.
#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    app_id: String,
    username: String,
    public_key: String,
    secret_key: String,
}

impl Drop for IdentityRecord {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

/// The canonical form a block signature covers. The server rebuilds this
/// exact JSON from the write request to verify ownership, so field order
/// matters and must not change.
#[derive(Serialize)]
struct SigningForm<'a> {
    public: &'a str,
    group: &'a str,
    key: &'a str,
    version: u64,
    data: &'a str,
}

fn signing_bytes(
    public: &str,
    group: &str,
    key: &str,
    version: u64,
    data: &str,
) -> Result<Vec<u8>, IdentityError> {
    serde_json::to_vec(&SigningForm {
        public,
        group,
        key,
        version,
        data,
    })
    .map_err(|e| IdentityError::SerializationError(e.to_string()))
}

/// A user's cryptographic identity within one application namespace.
///
/// The keypair is a pure function of (app id, username, password): the
/// credentials are hashed with SHA-256 and the digest seeds the Ed25519
/// signing key. Logging in twice is therefore idempotent.
pub struct Identity {
    app_id: String,
    username: String,
    signing_key: SigningKey,
    public: VerifyingKey,
}

impl Identity {
    /// Derive an identity from credentials. Pure and deterministic; no
    /// network and no local state involved.
    pub fn derive(
        app_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, IdentityError> {
        if app_id.is_empty() || username.is_empty() || password.is_empty() {
            return Err(IdentityError::InvalidCredentials);
        }

        let seed = Self::credential_hash(app_id, username, password);
        let signing_key = SigningKey::from_bytes(&seed);
        let public = signing_key.verifying_key();

        Ok(Self {
            app_id: app_id.to_string(),
            username: username.to_string(),
            signing_key,
            public,
        })
    }

    fn credential_hash(app_id: &str, username: &str, password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(app_id.as_bytes());
        hasher.update(b":");
        hasher.update(username.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Ed25519 verifying key bytes. This is the address under which the
    /// identity's blocks live on the server.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Hex form of the public key, as it appears in URLs and block JSON.
    pub fn public_key(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// Sign a block's (group, key, version, payload) with this identity's
    /// secret key. Returns the hex-encoded signature carried in block JSON.
    pub fn sign_block(
        &self,
        group: &str,
        key: &str,
        version: u64,
        data: &str,
    ) -> Result<String, IdentityError> {
        let bytes = signing_bytes(&self.public_key(), group, key, version, data)?;
        let sig = self.signing_key.sign(&bytes);
        Ok(hex::encode(sig.to_bytes()))
    }

    /// Verify a block signature against an arbitrary owner public key.
    /// Any malformed input (bad hex, wrong lengths) fails verification.
    pub fn verify_block_signature(
        public_key: &str,
        group: &str,
        key: &str,
        version: u64,
        data: &str,
        signature: &str,
    ) -> bool {
        let Ok(bytes) = signing_bytes(public_key, group, key, version, data) else {
            return false;
        };

        let Ok(pk_vec) = hex::decode(public_key) else {
            return false;
        };
        let pk_bytes: [u8; 32] = match pk_vec.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_bytes) else {
            return false;
        };

        let Ok(sig_vec) = hex::decode(signature) else {
            return false;
        };
        let sig_bytes: [u8; 64] = match sig_vec.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };

        let sig = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(&bytes, &sig).is_ok()
    }

    /// Structural self-check without contacting the server: the stored
    /// public key must be non-zero and must match the key recomputed from
    /// the secret half. Used after `restore_local` to detect tampering.
    pub fn verify_integrity(&self) -> bool {
        let public = self.public.to_bytes();
        public != [0u8; 32] && self.signing_key.verifying_key().to_bytes() == public
    }

    /// Whether an identity has been persisted to the slot.
    pub fn exists(store: &dyn LocalStore) -> Result<bool, IdentityError> {
        Ok(store.get(IDENTITY_SLOT_KEY)?.is_some())
    }

    /// Serialize the full identity (secret key included) into the single
    /// local slot, overwriting any prior value. Last-writer-wins.
    pub fn persist_local(&self, store: &dyn LocalStore) -> Result<(), IdentityError> {
        let record = IdentityRecord {
            app_id: self.app_id.clone(),
            username: self.username.clone(),
            public_key: self.public_key(),
            secret_key: hex::encode(self.signing_key.to_bytes()),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| IdentityError::SerializationError(e.to_string()))?;
        store.set(IDENTITY_SLOT_KEY, &json)?;
        Ok(())
    }

    /// Restore the identity persisted by `persist_local`.
    ///
    /// Fails with `NotFound` if the slot is empty and `Corrupt` if the
    /// stored form does not parse back into a well-formed keypair. Callers
    /// should still run `verify_integrity` on the result.
    pub fn restore_local(store: &dyn LocalStore) -> Result<Self, IdentityError> {
        let json = store
            .get(IDENTITY_SLOT_KEY)?
            .ok_or(IdentityError::NotFound)?;

        let record: IdentityRecord = serde_json::from_str(&json)
            .map_err(|e| IdentityError::Corrupt(e.to_string()))?;

        let secret_vec = hex::decode(&record.secret_key)
            .map_err(|e| IdentityError::Corrupt(format!("secret key hex: {}", e)))?;
        let secret_bytes: [u8; 32] = secret_vec
            .try_into()
            .map_err(|_| IdentityError::Corrupt("secret key has wrong length".to_string()))?;

        let public_vec = hex::decode(&record.public_key)
            .map_err(|e| IdentityError::Corrupt(format!("public key hex: {}", e)))?;
        let public_bytes: [u8; 32] = public_vec
            .try_into()
            .map_err(|_| IdentityError::Corrupt("public key has wrong length".to_string()))?;

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let public = VerifyingKey::from_bytes(&public_bytes)
            .map_err(|e| IdentityError::Corrupt(format!("public key: {}", e)))?;

        Ok(Self {
            app_id: record.app_id.clone(),
            username: record.username.clone(),
            signing_key,
            public,
        })
    }

    /// Remove the persisted identity from the slot.
    pub fn clear_local(store: &dyn LocalStore) -> Result<(), IdentityError> {
        store.remove(IDENTITY_SLOT_KEY)?;
        Ok(())
    }
}
