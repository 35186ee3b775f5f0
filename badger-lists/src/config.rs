//! Shared list configuration.

use badger_crypto::KdfParams;
use serde::{Deserialize, Serialize};

/// Placeholder title shown for lists the current user cannot decrypt.
pub const DEFAULT_LOCKED_TITLE: &str = "[Encrypted - Key not available]";

/// Configuration for the encrypted list repository and key service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListsConfig {
    /// Maximum number of lists that may be marked favorite at once.
    pub max_favorites: usize,

    /// Title substituted for lists that cannot be decrypted.
    pub locked_title: String,

    /// Rotate the list key immediately after every revoke. Off by default:
    /// revocation is then prospective only.
    pub rotate_on_revoke: bool,

    /// Re-encrypt list content under the new key when rotating.
    pub reencrypt_on_rotate: bool,

    /// Argon2id cost for mnemonic key backups.
    pub backup_kdf: KdfParams,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            max_favorites: 3,
            locked_title: DEFAULT_LOCKED_TITLE.to_string(),
            rotate_on_revoke: false,
            reencrypt_on_rotate: true,
            backup_kdf: KdfParams::default(),
        }
    }
}

impl ListsConfig {
    /// Creates a config with cheap key derivation for tests.
    pub fn test() -> Self {
        Self {
            backup_kdf: KdfParams::insecure_fast(),
            ..Self::default()
        }
    }
}
