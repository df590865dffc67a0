//! Client engine for the hashstorage server
//!
//! Derive a cryptographic identity from credentials, organize opaque data
//! into versioned blocks addressed by (owner public key, group, key), and
//! synchronize those blocks with a remote server under optimistic
//! concurrency control.
//!
//! ```no_run
//! use hashstorage_client::{Block, HttpApi, Identity};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let api = HttpApi::new("http://localhost:8000");
//! let identity = Identity::derive("appidstring", "alex", "Qwerty123")?;
//!
//! let mut block = Block::create(&identity.public_key(), "mygroup", "mykey");
//! block.set_data("Hello world");
//! block.save(&api, &identity).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod block;
pub mod groups;
pub mod guard;
pub mod identity;
pub mod local;

pub use api::{ApiError, BlockJson, HttpApi, MemoryApi, StorageApi, VersionInfo};
pub use block::{Block, BlockError, BlockVersion, RefetchError, SaveError};
pub use guard::VersionGuard;
pub use identity::{Identity, IdentityError};
pub use local::{FileStore, LocalStore, MemoryStore, StoreError};
