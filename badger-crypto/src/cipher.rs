//! ChaCha20-Poly1305 authenticated encryption.
//!
//! Every call draws a fresh 96-bit nonce from the OS CSPRNG. The optional
//! context is bound as associated data: it is not encrypted, but decryption
//! fails unless the exact same context is supplied again.
//!
//! Text form: `base64(nonce || ciphertext || tag)`.

use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// Nonce plus ciphertext-with-appended-tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Total size of the self-contained blob.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Splits a `nonce || ciphertext` blob. Anything shorter than a nonce
    /// plus a tag cannot be valid and is rejected up front.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "blob too short: {} bytes, need at least {}",
                bytes.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_SIZE..].to_vec(),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

/// Encrypts `plaintext` under `key` with no context.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    encrypt_with_context(key, plaintext, b"")
}

/// Decrypts data produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    decrypt_with_context(key, data, b"")
}

/// Encrypts `plaintext`, binding `context` as associated data.
pub fn encrypt_with_context(
    key: &SymmetricKey,
    plaintext: &[u8],
    context: &[u8],
) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: context,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts and verifies `data`; `context` must match what was used to encrypt.
pub fn decrypt_with_context(
    key: &SymmetricKey,
    data: &EncryptedData,
    context: &[u8],
) -> CryptoResult<Vec<u8>> {
    if data.ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decryption(format!(
            "ciphertext shorter than {TAG_SIZE}-byte tag"
        )));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            Nonce::from_slice(&data.nonce),
            Payload {
                msg: &data.ciphertext,
                aad: context,
            },
        )
        .map_err(|_| CryptoError::Decryption("wrong key or tampered data".to_string()))
}

/// Encrypts a UTF-8 string into the base64 text blob.
pub fn encrypt_string(
    key: &SymmetricKey,
    plaintext: &str,
    context: Option<&str>,
) -> CryptoResult<String> {
    let aad = context.map(str::as_bytes).unwrap_or_default();
    Ok(encrypt_with_context(key, plaintext.as_bytes(), aad)?.to_base64())
}

/// Decrypts a base64 text blob produced by [`encrypt_string`].
pub fn decrypt_string(key: &SymmetricKey, blob: &str, context: Option<&str>) -> CryptoResult<String> {
    let data = EncryptedData::from_base64(blob)?;
    let aad = context.map(str::as_bytes).unwrap_or_default();
    let plaintext = decrypt_with_context(key, &data, aad)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
}
