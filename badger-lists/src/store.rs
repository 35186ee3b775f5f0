//! Injected collaborators: remote document store, local cache, identity,
//! and the device secure store.
//!
//! Every remote call can fail transiently; implementations map transport
//! failures to [`ListError::RemoteUnavailable`](crate::ListError).

use crate::error::ListResult;
use crate::types::{EncryptedListRecord, ListKeyState, UserPublicKey, WrapEntry};
use async_trait::async_trait;

/// The remote document store shared by all users.
///
/// Layout:
/// - `shared_lists/{list_id}` holds an [`EncryptedListRecord`]
/// - `shared_lists/{list_id}/user_keys/{user_id}` holds a [`WrapEntry`]
/// - `shared_lists/{list_id}/key_state` holds the [`ListKeyState`]
/// - `public_keys/{user_id}` holds a [`UserPublicKey`]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ── Lists ───────────────────────────────────────────────────

    /// Reserves a fresh list id without writing a record.
    async fn allocate_list_id(&self) -> ListResult<String>;

    async fn get_list(&self, list_id: &str) -> ListResult<Option<EncryptedListRecord>>;

    /// Writes the full record, replacing any existing one.
    async fn put_list(&self, record: &EncryptedListRecord) -> ListResult<()>;

    async fn delete_list(&self, list_id: &str) -> ListResult<()>;

    /// All lists whose member set contains `user_id`.
    async fn lists_for_member(&self, user_id: &str) -> ListResult<Vec<EncryptedListRecord>>;

    /// Adds a user to the member set as a field update. No-op if present.
    async fn add_member(&self, list_id: &str, user_id: &str) -> ListResult<()>;

    /// Removes a user from the member set as a field update.
    async fn remove_member(&self, list_id: &str, user_id: &str) -> ListResult<()>;

    async fn set_favorite(&self, list_id: &str, favorite: bool) -> ListResult<()>;

    // ── Wrap entries ────────────────────────────────────────────

    async fn get_wrap_entry(&self, list_id: &str, user_id: &str) -> ListResult<Option<WrapEntry>>;

    async fn put_wrap_entry(&self, entry: &WrapEntry) -> ListResult<()>;

    async fn delete_wrap_entry(&self, list_id: &str, user_id: &str) -> ListResult<()>;

    async fn list_wrap_entries(&self, list_id: &str) -> ListResult<Vec<WrapEntry>>;

    // ── Key state ───────────────────────────────────────────────

    async fn get_key_state(&self, list_id: &str) -> ListResult<Option<ListKeyState>>;

    async fn put_key_state(&self, state: &ListKeyState) -> ListResult<()>;

    async fn delete_key_state(&self, list_id: &str) -> ListResult<()>;

    // ── Public key directory ────────────────────────────────────

    async fn get_public_key(&self, user_id: &str) -> ListResult<Option<UserPublicKey>>;

    async fn put_public_key(&self, key: &UserPublicKey) -> ListResult<()>;
}

/// Device-local cache of encrypted list records.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, list_id: &str) -> ListResult<Option<EncryptedListRecord>>;

    async fn put(&self, record: &EncryptedListRecord) -> ListResult<()>;

    async fn put_all(&self, records: &[EncryptedListRecord]) -> ListResult<()>;

    async fn remove(&self, list_id: &str) -> ListResult<()>;

    async fn all(&self) -> ListResult<Vec<EncryptedListRecord>>;
}

/// Supplies the signed-in user, if any.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Device-local string storage for protected secrets and preferences.
///
/// Values written here are already encrypted by
/// [`LocalSecrets`](crate::secrets::LocalSecrets); the store itself only
/// needs to persist strings.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, name: &str) -> ListResult<Option<String>>;

    async fn put(&self, name: &str, value: &str) -> ListResult<()>;

    async fn remove(&self, name: &str) -> ListResult<()>;
}
