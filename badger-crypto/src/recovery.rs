//! Private key backup via BIP39 mnemonic.
//!
//! A user who loses their device loses their X25519 secret, and with it every
//! list key wrapped for them. A [`KeyBackup`] lets them restore the same
//! keypair on a new device from a 12-word mnemonic instead of waiting for
//! other members to re-share.

use crate::cipher::{decrypt_with_context, encrypt_with_context, EncryptedData};
use crate::envelope::{UserKeyPair, X25519_KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, SymmetricKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

const BACKUP_CONTEXT: &[u8] = b"badger:key-backup:v1";

/// Secret key encrypted with a mnemonic-derived key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyBackup {
    /// Fingerprint of the public key this backup restores.
    pub key_id: String,
    pub encrypted_secret: EncryptedData,
    /// Unix timestamp when this backup was created.
    pub created_at: i64,
}

/// Generates a 12-word BIP39 mnemonic.
pub fn generate_recovery_mnemonic() -> CryptoResult<String> {
    // 128 bits of entropy -> 12 words
    let mut entropy = [0u8; 16];
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
        .map_err(|e| CryptoError::KeyDerivation(format!("mnemonic generation failed: {e}")));
    entropy.zeroize();

    Ok(mnemonic?.to_string())
}

/// Derives a 32-byte key from a BIP39 mnemonic phrase.
///
/// The fixed domain salt is acceptable because the mnemonic carries 128 bits
/// of entropy.
pub fn mnemonic_to_key(mnemonic: &str, params: &KdfParams) -> CryptoResult<SymmetricKey> {
    let _: bip39::Mnemonic = mnemonic
        .parse()
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid mnemonic: {e}")))?;

    let salt = Salt::from_bytes(*b"badger-mnemonic\0");
    derive_key(mnemonic, &salt, params)
}

/// Encrypts a keypair's secret under a mnemonic.
pub fn create_key_backup(
    keypair: &UserKeyPair,
    mnemonic: &str,
    params: &KdfParams,
) -> CryptoResult<KeyBackup> {
    let backup_key = mnemonic_to_key(mnemonic, params)?;
    let mut secret = keypair.secret_bytes();
    let encrypted_secret = encrypt_with_context(&backup_key, &secret, BACKUP_CONTEXT);
    secret.zeroize();

    Ok(KeyBackup {
        key_id: keypair.key_id(),
        encrypted_secret: encrypted_secret?,
        created_at: chrono::Utc::now().timestamp(),
    })
}

/// Restores a keypair from a backup and its mnemonic.
pub fn open_key_backup(
    backup: &KeyBackup,
    mnemonic: &str,
    params: &KdfParams,
) -> CryptoResult<UserKeyPair> {
    let backup_key = mnemonic_to_key(mnemonic, params)?;
    let mut plaintext = decrypt_with_context(&backup_key, &backup.encrypted_secret, BACKUP_CONTEXT)?;

    if plaintext.len() != X25519_KEY_SIZE {
        let actual = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: X25519_KEY_SIZE,
            actual,
        });
    }

    let mut bytes = [0u8; X25519_KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();
    let keypair = UserKeyPair::from_secret_bytes(bytes);
    bytes.zeroize();

    if keypair.key_id() != backup.key_id {
        return Err(CryptoError::Decryption(
            "backup restored a different key than recorded".to_string(),
        ));
    }
    Ok(keypair)
}
