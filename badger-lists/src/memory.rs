//! In-memory implementations of the store traits.
//!
//! Used by tests and by hosts that keep state elsewhere. The document store
//! can be switched offline, or given a write budget after which writes fail,
//! to exercise `RemoteUnavailable` and interrupted multi-step operations.

use crate::error::{ListError, ListResult};
use crate::store::{DocumentStore, IdentityProvider, LocalCache, SecureStore};
use crate::types::{EncryptedListRecord, ListKeyState, UserPublicKey, WrapEntry};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct RemoteState {
    lists: BTreeMap<String, EncryptedListRecord>,
    wrap_entries: BTreeMap<String, BTreeMap<String, WrapEntry>>,
    key_states: HashMap<String, ListKeyState>,
    public_keys: HashMap<String, UserPublicKey>,
}

/// Shared in-memory document store. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<RemoteState>>,
    offline: Arc<AtomicBool>,
    write_budget: Arc<Mutex<Option<usize>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `RemoteUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Allows `budget` more writes, after which writes fail. `None` lifts
    /// the limit.
    pub async fn set_write_budget(&self, budget: Option<usize>) {
        *self.write_budget.lock().await = budget;
    }

    fn check_online(&self) -> ListResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ListError::RemoteUnavailable("store is offline".into()));
        }
        Ok(())
    }

    async fn check_write(&self) -> ListResult<()> {
        self.check_online()?;
        let mut budget = self.write_budget.lock().await;
        match budget.as_mut() {
            Some(0) => Err(ListError::RemoteUnavailable(
                "connection lost during write".into(),
            )),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Number of wrap entries stored for a list.
    pub async fn wrap_entry_count(&self, list_id: &str) -> usize {
        self.state
            .read()
            .await
            .wrap_entries
            .get(list_id)
            .map_or(0, BTreeMap::len)
    }

    /// Overwrites a stored record without any checks. Test hook for
    /// simulating tampering by the server.
    pub async fn tamper_list(&self, record: EncryptedListRecord) {
        self.state
            .write()
            .await
            .lists
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn allocate_list_id(&self) -> ListResult<String> {
        self.check_online()?;
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn get_list(&self, list_id: &str) -> ListResult<Option<EncryptedListRecord>> {
        self.check_online()?;
        Ok(self.state.read().await.lists.get(list_id).cloned())
    }

    async fn put_list(&self, record: &EncryptedListRecord) -> ListResult<()> {
        self.check_write().await?;
        self.state
            .write()
            .await
            .lists
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> ListResult<()> {
        self.check_write().await?;
        self.state.write().await.lists.remove(list_id);
        Ok(())
    }

    async fn lists_for_member(&self, user_id: &str) -> ListResult<Vec<EncryptedListRecord>> {
        self.check_online()?;
        Ok(self
            .state
            .read()
            .await
            .lists
            .values()
            .filter(|r| r.is_member(user_id))
            .cloned()
            .collect())
    }

    async fn add_member(&self, list_id: &str, user_id: &str) -> ListResult<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let record = state
            .lists
            .get_mut(list_id)
            .ok_or_else(|| ListError::NotFound(format!("list {list_id}")))?;
        if !record.is_member(user_id) {
            record.shared_with_users.push(user_id.to_string());
        }
        Ok(())
    }

    async fn remove_member(&self, list_id: &str, user_id: &str) -> ListResult<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let record = state
            .lists
            .get_mut(list_id)
            .ok_or_else(|| ListError::NotFound(format!("list {list_id}")))?;
        record.shared_with_users.retain(|u| u != user_id);
        Ok(())
    }

    async fn set_favorite(&self, list_id: &str, favorite: bool) -> ListResult<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let record = state
            .lists
            .get_mut(list_id)
            .ok_or_else(|| ListError::NotFound(format!("list {list_id}")))?;
        record.is_favorite = favorite;
        Ok(())
    }

    async fn get_wrap_entry(&self, list_id: &str, user_id: &str) -> ListResult<Option<WrapEntry>> {
        self.check_online()?;
        Ok(self
            .state
            .read()
            .await
            .wrap_entries
            .get(list_id)
            .and_then(|entries| entries.get(user_id))
            .cloned())
    }

    async fn put_wrap_entry(&self, entry: &WrapEntry) -> ListResult<()> {
        self.check_write().await?;
        self.state
            .write()
            .await
            .wrap_entries
            .entry(entry.list_id.clone())
            .or_default()
            .insert(entry.user_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_wrap_entry(&self, list_id: &str, user_id: &str) -> ListResult<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if let Some(entries) = state.wrap_entries.get_mut(list_id) {
            entries.remove(user_id);
            if entries.is_empty() {
                state.wrap_entries.remove(list_id);
            }
        }
        Ok(())
    }

    async fn list_wrap_entries(&self, list_id: &str) -> ListResult<Vec<WrapEntry>> {
        self.check_online()?;
        Ok(self
            .state
            .read()
            .await
            .wrap_entries
            .get(list_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_key_state(&self, list_id: &str) -> ListResult<Option<ListKeyState>> {
        self.check_online()?;
        Ok(self.state.read().await.key_states.get(list_id).cloned())
    }

    async fn put_key_state(&self, key_state: &ListKeyState) -> ListResult<()> {
        self.check_write().await?;
        self.state
            .write()
            .await
            .key_states
            .insert(key_state.list_id.clone(), key_state.clone());
        Ok(())
    }

    async fn delete_key_state(&self, list_id: &str) -> ListResult<()> {
        self.check_write().await?;
        self.state.write().await.key_states.remove(list_id);
        Ok(())
    }

    async fn get_public_key(&self, user_id: &str) -> ListResult<Option<UserPublicKey>> {
        self.check_online()?;
        Ok(self.state.read().await.public_keys.get(user_id).cloned())
    }

    async fn put_public_key(&self, key: &UserPublicKey) -> ListResult<()> {
        self.check_write().await?;
        self.state
            .write()
            .await
            .public_keys
            .insert(key.user_id.clone(), key.clone());
        Ok(())
    }
}

/// In-memory local cache for one device.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    records: Arc<RwLock<HashMap<String, EncryptedListRecord>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalCache for InMemoryCache {
    async fn get(&self, list_id: &str) -> ListResult<Option<EncryptedListRecord>> {
        Ok(self.records.read().await.get(list_id).cloned())
    }

    async fn put(&self, record: &EncryptedListRecord) -> ListResult<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn put_all(&self, records: &[EncryptedListRecord]) -> ListResult<()> {
        let mut cached = self.records.write().await;
        for record in records {
            cached.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn remove(&self, list_id: &str) -> ListResult<()> {
        self.records.write().await.remove(list_id);
        Ok(())
    }

    async fn all(&self) -> ListResult<Vec<EncryptedListRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

/// Identity that can be signed in and out at runtime.
#[derive(Clone, Default)]
pub struct SessionIdentity {
    user_id: Arc<std::sync::RwLock<Option<String>>>,
}

impl SessionIdentity {
    pub fn signed_in(user_id: &str) -> Self {
        let identity = Self::default();
        identity.sign_in(user_id);
        identity
    }

    pub fn sign_in(&self, user_id: &str) {
        let mut slot = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(user_id.to_string());
    }

    pub fn sign_out(&self) {
        let mut slot = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// In-memory secure store. Contents are lost when the process exits, which
/// models an app reinstall.
#[derive(Clone, Default)]
pub struct InMemorySecureStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every stored value.
    pub async fn clear(&self) {
        self.values.write().await.clear();
    }
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn get(&self, name: &str) -> ListResult<Option<String>> {
        Ok(self.values.read().await.get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str) -> ListResult<()> {
        self.values
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str) -> ListResult<()> {
        self.values.write().await.remove(name);
        Ok(())
    }
}
