//! End-to-end encrypted shared lists for Badger.
//!
//! Provides:
//! - Per-user X25519 key pairs with a published public key directory
//! - Per-list content keys, wrapped once per member, with versioned rotation
//! - Field-level encryption of list titles and item content
//! - A repository that keeps the remote store, local cache and key material
//!   consistent and degrades undecryptable lists to a locked placeholder
//!
//! The remote store, local cache, identity and secure storage are injected
//! through the traits in [`store`]; [`memory`] and [`file_store`] provide
//! implementations.

pub mod codec;
pub mod config;
pub mod error;
pub mod file_store;
pub mod key_service;
pub mod key_store;
pub mod memory;
pub mod repository;
pub mod secrets;
pub mod store;
pub mod types;

pub use config::ListsConfig;
pub use error::{FailureCause, ListError, ListResult};
pub use key_service::KeyService;
pub use key_store::{ListKey, ListKeyStore, ReconcileReport};
pub use repository::EncryptedListRepository;
pub use secrets::LocalSecrets;
pub use store::{DocumentStore, IdentityProvider, LocalCache, SecureStore};
pub use types::*;
