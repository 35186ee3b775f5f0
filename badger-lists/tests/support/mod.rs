//! Shared helpers: one simulated device per user over a shared in-memory
//! document store.

#![allow(dead_code)]

use badger_lists::memory::{InMemoryCache, InMemoryDocumentStore, InMemorySecureStore, SessionIdentity};
use badger_lists::{EncryptedListRepository, KeyService, ListKeyStore, ListsConfig, LocalSecrets};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("badger_lists=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// One user's app install: local cache, secure storage and services.
pub struct Device {
    pub user_id: String,
    pub identity: SessionIdentity,
    pub cache: Arc<InMemoryCache>,
    pub keystore: Arc<InMemorySecureStore>,
    pub prefs: Arc<InMemorySecureStore>,
    pub keys: Arc<KeyService>,
    pub key_store: Arc<ListKeyStore>,
    pub repo: EncryptedListRepository,
}

impl Device {
    /// A fresh install for `user_id`, signed in, without key material.
    pub async fn install(remote: &InMemoryDocumentStore, user_id: &str, config: ListsConfig) -> Self {
        init_tracing();
        let remote: Arc<InMemoryDocumentStore> = Arc::new(remote.clone());
        let identity = SessionIdentity::signed_in(user_id);
        let cache = Arc::new(InMemoryCache::new());
        let keystore = Arc::new(InMemorySecureStore::new());
        let prefs = Arc::new(InMemorySecureStore::new());

        let secrets = LocalSecrets::open(keystore.as_ref(), prefs.clone())
            .await
            .expect("open local secrets");
        let keys = Arc::new(KeyService::new(
            remote.clone(),
            Arc::new(secrets),
            config.backup_kdf,
        ));
        let key_store = Arc::new(ListKeyStore::new(
            remote.clone(),
            keys.clone(),
            Arc::new(identity.clone()),
        ));
        let repo = EncryptedListRepository::new(
            remote,
            cache.clone(),
            Arc::new(identity.clone()),
            key_store.clone(),
            config,
        );

        Self {
            user_id: user_id.to_string(),
            identity,
            cache,
            keystore,
            prefs,
            keys,
            key_store,
            repo,
        }
    }

    /// A signed-in device whose user has initialized keys.
    pub async fn ready(remote: &InMemoryDocumentStore, user_id: &str) -> Self {
        Self::ready_with(remote, user_id, ListsConfig::test()).await
    }

    pub async fn ready_with(remote: &InMemoryDocumentStore, user_id: &str, config: ListsConfig) -> Self {
        let device = Self::install(remote, user_id, config).await;
        device
            .keys
            .initialize_user_keys(user_id)
            .await
            .expect("initialize user keys");
        device
    }

    /// Simulates uninstalling and reinstalling the app: local state is gone
    /// and a new key pair is generated and published.
    pub async fn reinstall(self, remote: &InMemoryDocumentStore) -> Self {
        let config = self.repo.config().clone();
        let device = Self::install(remote, &self.user_id, config).await;
        let created = device.repo.ensure_user_keys().await.expect("ensure keys");
        assert!(created, "a reinstalled device has no private key");
        device
    }
}

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const CAROL: &str = "carol";
