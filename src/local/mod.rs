//! Local key/value persistence
//!
//! The client keeps two kinds of local state: the persisted identity slot and
//! the version-guard records. Both go through the `LocalStore` trait so tests
//! (and embedders without a filesystem) can substitute an in-memory store.
//!
//! Semantics are last-writer-wins with no locking. Concurrent writers from
//! two processes are not supported.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

/// A flat string key/value store, the shape of a browser localStorage.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned lock only means some caller panicked mid-access; the map
    /// itself is still a consistent string table, so keep serving it.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct FileStoreContents {
    entries: HashMap<String, String>,
}

/// File-backed store: one JSON file holding the full key/value map.
///
/// The whole map is re-read on every `get` and rewritten on every `set`, so
/// the file on disk is always a complete, self-describing snapshot.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<FileStoreContents, StoreError> {
        if !self.path.exists() {
            return Ok(FileStoreContents::default());
        }
        let data =
            std::fs::read(&self.path).map_err(|e| StoreError::IoError(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn save(&self, contents: &FileStoreContents) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::IoError(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(contents)
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| StoreError::IoError(e.to_string()))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut contents = self.load()?;
        contents.entries.insert(key.to_string(), value.to_string());
        self.save(&contents)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut contents = self.load()?;
        contents.entries.remove(key);
        self.save(&contents)
    }
}
