//! Shared list error types.

use badger_crypto::CryptoError;
use thiserror::Error;

/// Result type for list and key operations.
pub type ListResult<T> = Result<T, ListError>;

/// Errors that can occur in key management and list operations.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("no user is signed in")]
    NotAuthenticated,

    /// No usable wrap entry for the current user. Expected after a revoke,
    /// before a share, or when a rotation has superseded the entry.
    #[error("no list key available for list {list_id}")]
    KeyNotFound { list_id: String },

    #[error("user {user_id} has not published a public key")]
    RecipientKeyUnavailable { user_id: String },

    /// Tag mismatch, wrong key, context mismatch, or malformed ciphertext.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The private key was never stored on this device.
    #[error("no private key stored on this device for user {user_id}")]
    PrivateKeyMissing { user_id: String },

    /// The local secure store holds data that cannot be read back.
    #[error("local secure store error: {0}")]
    LocalStore(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The failure causes exposed to callers of the list repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    NotAuthenticated,
    KeyNotFound,
    AuthenticationFailure,
    RecipientKeyUnavailable,
    RemoteUnavailable,
    NotFound,
}

impl ListError {
    /// Projects this error onto the caller-facing taxonomy.
    pub fn cause(&self) -> FailureCause {
        match self {
            ListError::NotAuthenticated => FailureCause::NotAuthenticated,
            ListError::KeyNotFound { .. } | ListError::PrivateKeyMissing { .. } => {
                FailureCause::KeyNotFound
            }
            ListError::RecipientKeyUnavailable { .. } => FailureCause::RecipientKeyUnavailable,
            ListError::AuthenticationFailure(_)
            | ListError::LocalStore(_)
            | ListError::Serialization(_) => FailureCause::AuthenticationFailure,
            ListError::RemoteUnavailable(_) => FailureCause::RemoteUnavailable,
            ListError::NotFound(_) | ListError::InvalidArgument(_) => FailureCause::NotFound,
        }
    }

    /// Only transient store failures are worth retrying with the same inputs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ListError::RemoteUnavailable(_))
    }

    /// True for failures a read path degrades to a locked placeholder.
    pub fn is_locked(&self) -> bool {
        matches!(
            self.cause(),
            FailureCause::KeyNotFound | FailureCause::AuthenticationFailure
        )
    }

    /// Short user-facing explanation.
    pub fn reason(&self) -> &'static str {
        match self {
            ListError::InvalidArgument(_) => return "That change is not allowed",
            ListError::PrivateKeyMissing { .. } => {
                return "This device has no encryption key yet; restore a backup or ask a member to re-share";
            }
            _ => {}
        }
        match self.cause() {
            FailureCause::NotAuthenticated => "You need to sign in first",
            FailureCause::KeyNotFound => "You no longer have access to this list",
            FailureCause::AuthenticationFailure => {
                "This list could not be decrypted; it may have been tampered with"
            }
            FailureCause::RecipientKeyUnavailable => {
                "That person has not set up encryption yet"
            }
            FailureCause::RemoteUnavailable => "Network failure, please try again",
            FailureCause::NotFound => "The list could not be found",
        }
    }
}

impl From<CryptoError> for ListError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Encryption(msg) => {
                ListError::AuthenticationFailure(format!("encryption failed: {msg}"))
            }
            CryptoError::Decryption(msg) => ListError::AuthenticationFailure(msg),
            CryptoError::InvalidKeyLength { expected, actual } => ListError::AuthenticationFailure(
                format!("invalid key length: expected {expected}, got {actual}"),
            ),
            CryptoError::InvalidEncoding(msg) => ListError::AuthenticationFailure(msg),
            CryptoError::KeyDerivation(msg) => ListError::InvalidArgument(msg),
        }
    }
}
