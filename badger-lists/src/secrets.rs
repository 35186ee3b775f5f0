//! Device-local protected storage.
//!
//! A device master key lives in a hardware-backed keystore (modelled as a
//! [`SecureStore`]). Every other secret, such as a user's private key, is
//! encrypted under the master key before it reaches the preference store.
//! The storage name is bound as AEAD context, so a value copied into
//! another slot fails to decrypt.

use crate::error::{ListError, ListResult};
use crate::store::SecureStore;
use badger_crypto::{decrypt_string, encrypt_string, generate_random_key, SymmetricKey};
use std::sync::Arc;
use tracing::{info, warn};

/// Keystore alias of the device master key.
pub const MASTER_KEY_ALIAS: &str = "badger_master_key";

/// Loads the device master key, creating it on first use.
pub async fn load_or_create_master_key(keystore: &dyn SecureStore) -> ListResult<SymmetricKey> {
    if let Some(encoded) = keystore.get(MASTER_KEY_ALIAS).await? {
        return SymmetricKey::from_base64(&encoded)
            .map_err(|e| ListError::LocalStore(format!("unreadable master key: {e}")));
    }

    let key = generate_random_key();
    keystore.put(MASTER_KEY_ALIAS, &key.to_base64()).await?;
    info!("created device master key");
    Ok(key)
}

/// Encrypts values under the device master key before storing them.
pub struct LocalSecrets {
    master: SymmetricKey,
    store: Arc<dyn SecureStore>,
}

impl LocalSecrets {
    pub fn new(master: SymmetricKey, store: Arc<dyn SecureStore>) -> Self {
        Self { master, store }
    }

    /// Opens the protected store using the keystore's master key.
    pub async fn open(
        keystore: &dyn SecureStore,
        store: Arc<dyn SecureStore>,
    ) -> ListResult<Self> {
        let master = load_or_create_master_key(keystore).await?;
        Ok(Self::new(master, store))
    }

    pub async fn protect(&self, name: &str, value: &str) -> ListResult<()> {
        let blob = encrypt_string(&self.master, value, Some(name))?;
        self.store.put(name, &blob).await
    }

    /// Returns `None` if nothing was stored under `name`, and
    /// [`ListError::LocalStore`] if the stored value cannot be decrypted.
    pub async fn reveal(&self, name: &str) -> ListResult<Option<String>> {
        let Some(blob) = self.store.get(name).await? else {
            return Ok(None);
        };
        match decrypt_string(&self.master, &blob, Some(name)) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("protected value {name} failed to decrypt: {e}");
                Err(ListError::LocalStore(format!("protected value {name} is unreadable")))
            }
        }
    }

    pub async fn contains(&self, name: &str) -> ListResult<bool> {
        Ok(self.store.get(name).await?.is_some())
    }

    pub async fn forget(&self, name: &str) -> ListResult<()> {
        self.store.remove(name).await
    }
}
