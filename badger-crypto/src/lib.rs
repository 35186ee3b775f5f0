//! Cryptographic primitives for Badger shared lists.
//!
//! Provides:
//! - ChaCha20-Poly1305 authenticated encryption with optional bound context
//! - 256-bit symmetric keys with zeroization and Argon2id derivation
//! - X25519 envelope encryption for wrapping list keys per user
//! - BIP39 mnemonic backup of a user's private key
//!
//! # Architecture
//!
//! Every shared list has one random **list content key**. The key is never
//! stored in the clear: for each authorized user it is sealed to that
//! user's X25519 public key, producing one envelope per (list, user).
//! Title and item content are encrypted under the list content key.
//!
//! This crate does no I/O. Storage, identity, and orchestration live in
//! `badger-lists`.

mod cipher;
pub mod envelope;
mod error;
mod key;
pub mod recovery;

pub use cipher::{
    decrypt, decrypt_string, decrypt_with_context, encrypt, encrypt_string, encrypt_with_context,
    EncryptedData, NONCE_SIZE, TAG_SIZE,
};
pub use envelope::{
    decode_public_key, encode_public_key, generate_user_keypair, key_id, open_key, seal_key,
    SealedEnvelope, UserKeyPair,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, KdfParams, Salt, SymmetricKey, KEY_SIZE, SALT_SIZE};
pub use recovery::{
    create_key_backup, generate_recovery_mnemonic, mnemonic_to_key, open_key_backup, KeyBackup,
};

pub use crypto_box::{PublicKey, SecretKey};
