//! Per-user asymmetric key management.
//!
//! Each user holds one X25519 key pair. The public half is published to the
//! remote directory so others can wrap list keys for them; the private half
//! never leaves the device except inside a mnemonic-protected backup.

use crate::error::{ListError, ListResult};
use crate::secrets::LocalSecrets;
use crate::store::DocumentStore;
use crate::types::UserPublicKey;
use badger_crypto::{
    create_key_backup, decode_public_key, encode_public_key, generate_recovery_mnemonic,
    generate_user_keypair, key_id, open_key, open_key_backup, seal_key, KdfParams, KeyBackup,
    PublicKey, SealedEnvelope, SymmetricKey, UserKeyPair,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn private_key_slot(user_id: &str) -> String {
    format!("user:{user_id}:private_key")
}

/// Manages the current device's user key pairs and the public key directory.
pub struct KeyService {
    remote: Arc<dyn DocumentStore>,
    secrets: Arc<LocalSecrets>,
    backup_kdf: KdfParams,
}

impl KeyService {
    pub fn new(
        remote: Arc<dyn DocumentStore>,
        secrets: Arc<LocalSecrets>,
        backup_kdf: KdfParams,
    ) -> Self {
        Self {
            remote,
            secrets,
            backup_kdf,
        }
    }

    pub fn generate_key_pair(&self) -> UserKeyPair {
        generate_user_keypair()
    }

    /// Publishes a public key. Overwrites any previous one.
    pub async fn publish_public_key(&self, user_id: &str, public: &PublicKey) -> ListResult<()> {
        let record = UserPublicKey {
            user_id: user_id.to_string(),
            public_key: encode_public_key(public),
            key_id: key_id(public),
            published_at: Utc::now(),
        };
        self.remote.put_public_key(&record).await?;
        debug!("published public key {} for user {user_id}", record.key_id);
        Ok(())
    }

    /// Returns `None` when the user has not initialized keys yet.
    pub async fn fetch_public_key(&self, user_id: &str) -> ListResult<Option<PublicKey>> {
        let Some(record) = self.remote.get_public_key(user_id).await? else {
            return Ok(None);
        };
        let public = decode_public_key(&record.public_key).map_err(|e| {
            warn!("published key for user {user_id} is malformed: {e}");
            ListError::AuthenticationFailure(format!("malformed public key for {user_id}"))
        })?;
        Ok(Some(public))
    }

    pub async fn protect_private_key(&self, user_id: &str, keypair: &UserKeyPair) -> ListResult<()> {
        self.secrets
            .protect(&private_key_slot(user_id), &keypair.secret_base64())
            .await
    }

    /// Loads this device's private key for `user_id`.
    ///
    /// Distinguishes "never stored here" ([`ListError::PrivateKeyMissing`])
    /// from "stored but unreadable" ([`ListError::LocalStore`]).
    pub async fn retrieve_private_key(&self, user_id: &str) -> ListResult<UserKeyPair> {
        let encoded = self
            .secrets
            .reveal(&private_key_slot(user_id))
            .await?
            .ok_or_else(|| ListError::PrivateKeyMissing {
                user_id: user_id.to_string(),
            })?;
        UserKeyPair::from_secret_base64(&encoded)
            .map_err(|e| ListError::LocalStore(format!("stored private key is invalid: {e}")))
    }

    pub async fn has_private_key(&self, user_id: &str) -> ListResult<bool> {
        self.secrets.contains(&private_key_slot(user_id)).await
    }

    /// Seals a list key to a recipient. Returns the base64 envelope.
    pub fn wrap(&self, list_key: &SymmetricKey, recipient: &PublicKey) -> ListResult<String> {
        Ok(seal_key(list_key, recipient)?.to_base64())
    }

    /// Opens a wrapped list key with `user_id`'s private key.
    pub async fn unwrap(&self, wrapped: &str, user_id: &str) -> ListResult<SymmetricKey> {
        let keypair = self.retrieve_private_key(user_id).await?;
        let envelope = SealedEnvelope::from_base64(wrapped)?;
        Ok(open_key(&envelope, &keypair.secret)?)
    }

    /// Generates a key pair, protects the private half locally, and
    /// publishes the public half. Returns the new key id.
    pub async fn initialize_user_keys(&self, user_id: &str) -> ListResult<String> {
        let keypair = self.generate_key_pair();
        self.protect_private_key(user_id, &keypair).await?;
        self.publish_public_key(user_id, &keypair.public).await?;
        info!("initialized encryption keys for user {user_id}");
        Ok(keypair.key_id())
    }

    /// Makes sure this device holds a private key and that the matching
    /// public key is published. Returns true if a new key pair was created.
    ///
    /// A new key pair replaces the published one, so existing wrap entries
    /// for this user go stale until a member re-shares (see
    /// [`EncryptedListRepository::reconcile`](crate::EncryptedListRepository::reconcile)).
    pub async fn ensure_user_keys(&self, user_id: &str) -> ListResult<bool> {
        match self.retrieve_private_key(user_id).await {
            Ok(keypair) => {
                let published = self.remote.get_public_key(user_id).await?;
                if published.is_none_or(|p| p.key_id != keypair.key_id()) {
                    warn!("public key for user {user_id} missing or outdated, republishing");
                    self.publish_public_key(user_id, &keypair.public).await?;
                }
                Ok(false)
            }
            Err(ListError::PrivateKeyMissing { .. }) => {
                self.initialize_user_keys(user_id).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a mnemonic-protected backup of the stored private key.
    pub async fn export_backup(&self, user_id: &str) -> ListResult<(String, KeyBackup)> {
        let keypair = self.retrieve_private_key(user_id).await?;
        let mnemonic = generate_recovery_mnemonic()?;
        let backup = create_key_backup(&keypair, &mnemonic, &self.backup_kdf)?;
        info!("exported key backup {} for user {user_id}", backup.key_id);
        Ok((mnemonic, backup))
    }

    /// Restores a private key from a backup, stores it on this device, and
    /// republishes its public key.
    pub async fn restore_backup(
        &self,
        user_id: &str,
        backup: &KeyBackup,
        mnemonic: &str,
    ) -> ListResult<()> {
        let keypair = open_key_backup(backup, mnemonic, &self.backup_kdf).map_err(|e| {
            warn!("key backup restore failed for user {user_id}: {e}");
            ListError::from(e)
        })?;
        self.protect_private_key(user_id, &keypair).await?;
        self.publish_public_key(user_id, &keypair.public).await?;
        info!("restored key {} for user {user_id} from backup", keypair.key_id());
        Ok(())
    }
}
