//! Envelope encryption for list key sharing.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305 to wrap list content keys
//! for each authorized user. Each wrap uses a fresh ephemeral keypair, so
//! the sender is not identified and two wraps of the same key differ.
//!
//! Envelopes are small by construction: they carry a 32-byte symmetric key,
//! never bulk list content.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{SymmetricKey, KEY_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Size of an X25519 public or secret key.
pub const X25519_KEY_SIZE: usize = 32;

/// Size of the XSalsa20 nonce.
pub const ENVELOPE_NONCE_SIZE: usize = 24;

/// X25519 keypair identifying one user for key wrapping.
///
/// The secret key zeroizes itself on drop (from crypto_box).
pub struct UserKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl UserKeyPair {
    /// Returns the public key as raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Returns the secret key as raw 32-byte array.
    pub fn secret_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Base64 form of the secret key for protected local storage.
    pub fn secret_base64(&self) -> String {
        let mut bytes = self.secret_bytes();
        let encoded = STANDARD.encode(bytes);
        bytes.zeroize();
        encoded
    }

    /// Inverse of [`secret_base64`](Self::secret_base64).
    pub fn from_secret_base64(encoded: &str) -> CryptoResult<Self> {
        let mut decoded = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidEncoding(format!("secret key is not base64: {e}")))?;
        if decoded.len() != X25519_KEY_SIZE {
            let actual = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: X25519_KEY_SIZE,
                actual,
            });
        }
        let mut bytes = [0u8; X25519_KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        let keypair = Self::from_secret_bytes(bytes);
        bytes.zeroize();
        Ok(keypair)
    }

    /// Exported (base64) form of the public key, as published to other users.
    pub fn public_base64(&self) -> String {
        encode_public_key(&self.public)
    }

    /// Fingerprint of the public key.
    pub fn key_id(&self) -> String {
        key_id(&self.public)
    }
}

impl std::fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKeyPair")
            .field("key_id", &self.key_id())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A symmetric key sealed to one recipient's public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; X25519_KEY_SIZE],
    /// XSalsa20 nonce.
    pub nonce: [u8; ENVELOPE_NONCE_SIZE],
    /// Wrapped key plus Poly1305 tag.
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// `base64(ephemeral_pk || nonce || ciphertext)`, the stored form of a wrap entry.
    pub fn to_base64(&self) -> String {
        let mut out =
            Vec::with_capacity(X25519_KEY_SIZE + ENVELOPE_NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.ephemeral_public_key);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        STANDARD.encode(out)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("envelope is not base64: {e}")))?;

        let header = X25519_KEY_SIZE + ENVELOPE_NONCE_SIZE;
        if bytes.len() <= header {
            return Err(CryptoError::Decryption(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }

        let mut ephemeral_public_key = [0u8; X25519_KEY_SIZE];
        ephemeral_public_key.copy_from_slice(&bytes[..X25519_KEY_SIZE]);
        let mut nonce = [0u8; ENVELOPE_NONCE_SIZE];
        nonce.copy_from_slice(&bytes[X25519_KEY_SIZE..header]);

        Ok(Self {
            ephemeral_public_key,
            nonce,
            ciphertext: bytes[header..].to_vec(),
        })
    }
}

/// Generates a new X25519 keypair.
pub fn generate_user_keypair() -> UserKeyPair {
    let secret = SecretKey::generate(&mut OsRng);
    let public = secret.public_key();
    UserKeyPair { secret, public }
}

/// Seals arbitrary short bytes for a recipient.
pub fn seal_bytes(secret: &[u8], recipient_pk: &PublicKey) -> CryptoResult<SealedEnvelope> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; ENVELOPE_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), secret)
        .map_err(|e| CryptoError::Encryption(format!("envelope seal failed: {e}")))?;

    Ok(SealedEnvelope {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed envelope with the recipient's secret key.
pub fn open_bytes(envelope: &SealedEnvelope, recipient_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = PublicKey::from(envelope.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&envelope.nonce),
            envelope.ciphertext.as_ref(),
        )
        .map_err(|_| {
            CryptoError::Decryption("envelope open failed (wrong key or tampered data)".to_string())
        })
}

/// Wraps a list content key for a recipient.
pub fn seal_key(key: &SymmetricKey, recipient_pk: &PublicKey) -> CryptoResult<SealedEnvelope> {
    seal_bytes(key.as_bytes(), recipient_pk)
}

/// Unwraps a list content key. Anything but exactly 32 bytes is rejected.
pub fn open_key(envelope: &SealedEnvelope, recipient_sk: &SecretKey) -> CryptoResult<SymmetricKey> {
    let mut plaintext = open_bytes(envelope, recipient_sk)?;
    if plaintext.len() != KEY_SIZE {
        let actual = plaintext.len();
        plaintext.zeroize();
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual,
        });
    }
    let key = SymmetricKey::from_slice(&plaintext);
    plaintext.zeroize();
    key
}

pub fn encode_public_key(pk: &PublicKey) -> String {
    STANDARD.encode(pk.as_bytes())
}

pub fn decode_public_key(encoded: &str) -> CryptoResult<PublicKey> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidEncoding(format!("public key is not base64: {e}")))?;
    let arr: [u8; X25519_KEY_SIZE] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: X25519_KEY_SIZE,
                actual: bytes.len(),
            })?;
    Ok(PublicKey::from(arr))
}

/// Hex SHA-256 of the raw public key, truncated to 16 bytes.
pub fn key_id(pk: &PublicKey) -> String {
    let digest = Sha256::digest(pk.as_bytes());
    hex::encode(&digest[..16])
}
