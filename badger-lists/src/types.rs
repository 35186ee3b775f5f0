//! Shared list types: plaintext views, persisted ciphertext records, and
//! key-management documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Item priority. Stored in plaintext.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A list item as seen by callers, with `content` in plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub priority: Priority,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ListItem {
    pub fn new(content: impl Into<String>, priority: Priority, created_by: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            is_completed: false,
            priority,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            completed_by: None,
            completed_at: None,
        }
    }
}

/// A shared list as seen by callers, with title and item content in plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedList {
    pub id: String,
    pub title: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
    pub shared_with_users: Vec<String>,
    pub items: Vec<ListItem>,
    #[serde(default)]
    pub is_favorite: bool,
    /// Set when the list could not be decrypted for the current user. The
    /// title then holds a placeholder and `items` is empty.
    #[serde(default)]
    pub is_locked: bool,
}

/// Persisted item: `content` is ciphertext, everything else is plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedListItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub priority: Priority,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The remote and cached form of a shared list.
///
/// `title` and every item's `content` are ciphertext under the list content
/// key of `key_version`. All other fields are plaintext and usable for
/// indexing and sorting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedListRecord {
    pub id: String,
    pub title: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
    /// Visible member set. Kept in step with wrap entries by the repository.
    pub shared_with_users: Vec<String>,
    pub items: Vec<EncryptedListItem>,
    #[serde(default)]
    pub is_favorite: bool,
    pub key_version: u64,
}

impl EncryptedListRecord {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.shared_with_users.iter().any(|u| u == user_id)
    }
}

/// One user's wrapped copy of a list content key.
///
/// Stored at `{list_id}/user_keys/{user_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapEntry {
    pub list_id: String,
    pub user_id: String,
    /// Base64 sealed envelope holding the list content key.
    pub wrapped_key: String,
    pub key_version: u64,
    /// Fingerprint of the public key the envelope was sealed to.
    pub recipient_key_id: String,
    pub wrapped_by: String,
    pub created_at: DateTime<Utc>,
    /// Wrap of the next key, written by a rotation before it commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingWrap>,
}

impl WrapEntry {
    /// This entry as usable at `version`: the committed wrap when its
    /// version matches, otherwise a staged wrap for that version promoted
    /// into place. `None` when neither matches.
    pub fn at_version(&self, version: u64) -> Option<WrapEntry> {
        if self.key_version == version {
            return Some(WrapEntry {
                pending: None,
                ..self.clone()
            });
        }
        let staged = self.pending.as_ref().filter(|p| p.key_version == version)?;
        Some(WrapEntry {
            wrapped_key: staged.wrapped_key.clone(),
            key_version: staged.key_version,
            recipient_key_id: staged.recipient_key_id.clone(),
            pending: None,
            ..self.clone()
        })
    }
}

/// A wrapped key staged on a [`WrapEntry`] until its rotation commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrap {
    pub wrapped_key: String,
    pub key_version: u64,
    pub recipient_key_id: String,
}

impl From<&WrapEntry> for PendingWrap {
    fn from(entry: &WrapEntry) -> Self {
        Self {
            wrapped_key: entry.wrapped_key.clone(),
            key_version: entry.key_version,
            recipient_key_id: entry.recipient_key_id.clone(),
        }
    }
}

/// An older list key sealed under its successor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyLink {
    /// Version of the sealed (older) key. It is sealed under `version + 1`.
    pub version: u64,
    pub sealed_key: String,
}

/// Per-list key bookkeeping; the single source of truth for which key
/// version is active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListKeyState {
    pub list_id: String,
    pub key_version: u64,
    pub rotated_by: String,
    pub rotated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<KeyLink>,
}

/// A published public key, stored at `public_keys/{user_id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPublicKey {
    pub user_id: String,
    /// Base64 X25519 public key.
    pub public_key: String,
    pub key_id: String,
    pub published_at: DateTime<Utc>,
}
