//! Encrypted list repository: the only entry point the UI talks to.
//!
//! Reads come from the local cache and degrade per list: a list whose key
//! is missing or whose ciphertext fails to verify is returned as a locked
//! placeholder instead of failing the whole call. Writes and key operations
//! surface every error.
//!
//! Access needs both a usable wrap entry and membership in the record's
//! member set. Sharing writes the wrap entry before adding the member;
//! revoking removes the member before deleting the wrap entry. Whichever
//! step is interrupted, the half-written state grants nothing, and
//! [`reconcile`](EncryptedListRepository::reconcile) repairs it.

use crate::codec::{decrypt_list, encrypt_list, locked_list};
use crate::config::ListsConfig;
use crate::error::{ListError, ListResult};
use crate::key_store::{ListKeyStore, ReconcileReport};
use crate::store::{DocumentStore, IdentityProvider, LocalCache};
use crate::types::{EncryptedListRecord, ListItem, Priority, SharedList};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct EncryptedListRepository {
    remote: Arc<dyn DocumentStore>,
    cache: Arc<dyn LocalCache>,
    identity: Arc<dyn IdentityProvider>,
    key_store: Arc<ListKeyStore>,
    config: ListsConfig,
}

impl EncryptedListRepository {
    pub fn new(
        remote: Arc<dyn DocumentStore>,
        cache: Arc<dyn LocalCache>,
        identity: Arc<dyn IdentityProvider>,
        key_store: Arc<ListKeyStore>,
        config: ListsConfig,
    ) -> Self {
        Self {
            remote,
            cache,
            identity,
            key_store,
            config,
        }
    }

    pub fn config(&self) -> &ListsConfig {
        &self.config
    }

    pub fn key_store(&self) -> &Arc<ListKeyStore> {
        &self.key_store
    }

    fn current_user(&self) -> ListResult<String> {
        self.identity
            .current_user_id()
            .ok_or(ListError::NotAuthenticated)
    }

    fn ensure_member(record: &EncryptedListRecord, user_id: &str) -> ListResult<()> {
        if record.is_member(user_id) {
            Ok(())
        } else {
            Err(ListError::KeyNotFound {
                list_id: record.id.clone(),
            })
        }
    }

    async fn remote_record(&self, list_id: &str) -> ListResult<EncryptedListRecord> {
        self.remote
            .get_list(list_id)
            .await?
            .ok_or_else(|| ListError::NotFound(format!("list {list_id}")))
    }

    async fn refresh_cache(&self, list_id: &str) -> ListResult<()> {
        match self.remote.get_list(list_id).await? {
            Some(record) => self.cache.put(&record).await,
            None => self.cache.remove(list_id).await,
        }
    }

    async fn persist(&self, record: &EncryptedListRecord) -> ListResult<()> {
        self.remote.put_list(record).await?;
        self.cache.put(record).await
    }

    /// Decrypts a record with the key version it was written under.
    async fn open(&self, record: &EncryptedListRecord, user_id: &str) -> ListResult<SharedList> {
        Self::ensure_member(record, user_id)?;
        let key = self
            .key_store
            .key_for_version(&record.id, record.key_version)
            .await?;
        decrypt_list(record, &key)
    }

    async fn open_or_lock(&self, record: &EncryptedListRecord, user_id: &str) -> ListResult<SharedList> {
        match self.open(record, user_id).await {
            Ok(list) => Ok(list),
            Err(e) if e.is_locked() => {
                warn!("list {} is locked for {user_id}: {e}", record.id);
                Ok(locked_list(record, &self.config.locked_title))
            }
            Err(e) => Err(e),
        }
    }

    /// Loads, edits and re-encrypts a list under its current key.
    async fn modify<F>(&self, list_id: &str, edit: F) -> ListResult<SharedList>
    where
        F: FnOnce(&mut SharedList, &str) -> ListResult<()> + Send,
    {
        let user = self.current_user()?;
        let record = self.remote_record(list_id).await?;
        let mut list = self.open(&record, &user).await?;
        let key = self.key_store.get_key(list_id).await?;

        edit(&mut list, &user)?;
        list.last_modified_by = user;
        list.last_modified_at = Utc::now();

        self.persist(&encrypt_list(&list, &key)?).await?;
        debug!("updated list {list_id} under key v{}", key.version);
        Ok(list)
    }

    // ── Lists ───────────────────────────────────────────────────

    /// Creates a list owned by the current user, with a fresh content key.
    pub async fn create_list(&self, title: &str) -> ListResult<SharedList> {
        let user = self.current_user()?;
        let list_id = self.remote.allocate_list_id().await?;
        let key = self.key_store.create_key(&list_id).await?;

        let now = Utc::now();
        let list = SharedList {
            id: list_id.clone(),
            title: title.to_string(),
            created_by: user.clone(),
            created_at: now,
            last_modified_by: user.clone(),
            last_modified_at: now,
            shared_with_users: vec![user],
            items: Vec::new(),
            is_favorite: false,
            is_locked: false,
        };

        self.persist(&encrypt_list(&list, &key)?).await?;
        info!("created list {list_id}");
        Ok(list)
    }

    /// Returns one list, from the cache if present, otherwise from the
    /// remote store. Undecryptable lists come back locked.
    pub async fn get_list_by_id(&self, list_id: &str) -> ListResult<SharedList> {
        let user = self.current_user()?;
        let record = match self.cache.get(list_id).await? {
            Some(record) => record,
            None => {
                let record = self.remote_record(list_id).await?;
                if record.is_member(&user) {
                    self.cache.put(&record).await?;
                }
                record
            }
        };
        self.open_or_lock(&record, &user).await
    }

    /// Returns every cached list. One locked list never hides the others.
    pub async fn get_all_lists(&self) -> ListResult<Vec<SharedList>> {
        let user = self.current_user()?;
        let records = self.cache.all().await?;
        let mut lists = Vec::with_capacity(records.len());
        for record in &records {
            lists.push(self.open_or_lock(record, &user).await?);
        }
        Ok(lists)
    }

    pub async fn get_favorite_lists(&self) -> ListResult<Vec<SharedList>> {
        let lists = self.get_all_lists().await?;
        Ok(lists.into_iter().filter(|l| l.is_favorite).collect())
    }

    /// Re-encrypts the title and items of `list`. Membership, creator and
    /// favorite state are taken from the stored record, not from `list`.
    pub async fn update_list(&self, list: &SharedList) -> ListResult<SharedList> {
        let title = list.title.clone();
        let items = list.items.clone();
        self.modify(&list.id, move |current, _| {
            current.title = title;
            current.items = items;
            Ok(())
        })
        .await
    }

    /// Deletes the record, its key material and the cached copy.
    pub async fn delete_list(&self, list_id: &str) -> ListResult<()> {
        let user = self.current_user()?;
        let record = self.remote_record(list_id).await?;
        Self::ensure_member(&record, &user)?;

        self.remote.delete_list(list_id).await?;
        self.key_store.delete_all(list_id).await?;
        self.cache.remove(list_id).await?;
        info!("deleted list {list_id}");
        Ok(())
    }

    /// Replaces the cache with the lists the current user is a member of.
    /// Returns the number of lists synced.
    pub async fn sync_lists(&self) -> ListResult<usize> {
        let user = self.current_user()?;
        let records = self.remote.lists_for_member(&user).await?;

        for cached in self.cache.all().await? {
            if !records.iter().any(|r| r.id == cached.id) {
                self.cache.remove(&cached.id).await?;
                debug!("dropped list {} from cache", cached.id);
            }
        }
        self.cache.put_all(&records).await?;

        info!("synced {} lists for {user}", records.len());
        Ok(records.len())
    }

    // ── Items ───────────────────────────────────────────────────

    pub async fn add_item(
        &self,
        list_id: &str,
        content: &str,
        priority: Priority,
    ) -> ListResult<SharedList> {
        let content = content.to_string();
        self.modify(list_id, move |list, user| {
            list.items.push(ListItem::new(content, priority, user));
            Ok(())
        })
        .await
    }

    pub async fn remove_item(&self, list_id: &str, item_id: &str) -> ListResult<SharedList> {
        self.modify(list_id, |list, _| {
            let before = list.items.len();
            list.items.retain(|item| item.id != item_id);
            if list.items.len() == before {
                return Err(ListError::NotFound(format!("item {item_id}")));
            }
            Ok(())
        })
        .await
    }

    pub async fn set_item_completed(
        &self,
        list_id: &str,
        item_id: &str,
        completed: bool,
    ) -> ListResult<SharedList> {
        self.modify(list_id, |list, user| {
            let item = list
                .items
                .iter_mut()
                .find(|item| item.id == item_id)
                .ok_or_else(|| ListError::NotFound(format!("item {item_id}")))?;
            item.is_completed = completed;
            if completed {
                item.completed_by = Some(user.to_string());
                item.completed_at = Some(Utc::now());
            } else {
                item.completed_by = None;
                item.completed_at = None;
            }
            Ok(())
        })
        .await
    }

    // ── Sharing ─────────────────────────────────────────────────

    /// Grants `target_user_id` access: wrap entry first, then membership.
    pub async fn share_list(&self, list_id: &str, target_user_id: &str) -> ListResult<()> {
        let user = self.current_user()?;
        let record = self.remote_record(list_id).await?;
        Self::ensure_member(&record, &user)?;

        self.key_store.share_with(list_id, target_user_id).await?;
        self.remote.add_member(list_id, target_user_id).await?;
        self.refresh_cache(list_id).await?;

        info!("shared list {list_id} with {target_user_id}");
        Ok(())
    }

    /// Removes `user_id`: membership first, then the wrap entry. The
    /// creator cannot be removed.
    ///
    /// Without `rotate_on_revoke` this is prospective only: a key the user
    /// already unwrapped still decrypts content written before the next
    /// rotation.
    pub async fn revoke_access(&self, list_id: &str, user_id: &str) -> ListResult<()> {
        let user = self.current_user()?;
        let record = self.remote_record(list_id).await?;
        Self::ensure_member(&record, &user)?;

        if record.created_by == user_id {
            return Err(ListError::InvalidArgument(
                "the list creator cannot be removed".into(),
            ));
        }

        self.remote.remove_member(list_id, user_id).await?;
        self.key_store.revoke(list_id, user_id).await?;
        self.refresh_cache(list_id).await?;
        info!("revoked {user_id} from list {list_id}");

        if self.config.rotate_on_revoke && user_id != user {
            self.rotate_list_key(list_id).await?;
        }
        Ok(())
    }

    /// Issues a new content key for the current members and, unless
    /// disabled, re-encrypts the list under it. Safe to retry.
    pub async fn rotate_list_key(&self, list_id: &str) -> ListResult<()> {
        let user = self.current_user()?;
        let record = self.remote_record(list_id).await?;
        let mut list = self.open(&record, &user).await?;

        let next = self
            .key_store
            .rotate(list_id, &record.shared_with_users)
            .await?;

        if self.config.reencrypt_on_rotate {
            list.last_modified_by = user;
            list.last_modified_at = Utc::now();
            self.persist(&encrypt_list(&list, &next)?).await?;
        } else {
            self.refresh_cache(list_id).await?;
        }

        info!("rotated key of list {list_id} to v{}", next.version);
        Ok(())
    }

    /// Repairs wrap entries against the member set. Run by any member after
    /// another member reinstalled and published a new key, or after an
    /// interrupted share or revoke.
    pub async fn reconcile(&self, list_id: &str) -> ListResult<ReconcileReport> {
        let user = self.current_user()?;
        let record = self.remote_record(list_id).await?;
        Self::ensure_member(&record, &user)?;
        self.key_store
            .reconcile(list_id, &record.shared_with_users)
            .await
    }

    // ── Favorites ───────────────────────────────────────────────

    /// Marks or unmarks a list as favorite, capped at `max_favorites`.
    pub async fn toggle_favorite(&self, list_id: &str, favorite: bool) -> ListResult<()> {
        self.current_user()?;
        let mut record = match self.cache.get(list_id).await? {
            Some(record) => record,
            None => self.remote_record(list_id).await?,
        };

        if favorite && !record.is_favorite {
            let count = self.favorite_count().await?;
            if count >= self.config.max_favorites {
                return Err(ListError::InvalidArgument(format!(
                    "maximum of {} favorite lists allowed",
                    self.config.max_favorites
                )));
            }
        }

        self.remote.set_favorite(list_id, favorite).await?;
        record.is_favorite = favorite;
        self.cache.put(&record).await?;
        debug!("list {list_id} favorite = {favorite}");
        Ok(())
    }

    pub async fn favorite_count(&self) -> ListResult<usize> {
        Ok(self
            .cache
            .all()
            .await?
            .iter()
            .filter(|r| r.is_favorite)
            .count())
    }

    // ── Keys ────────────────────────────────────────────────────

    /// Makes sure the signed-in user has a key pair on this device and a
    /// published public key. Returns true if a new pair was created.
    pub async fn ensure_user_keys(&self) -> ListResult<bool> {
        let user = self.current_user()?;
        self.key_store.key_service().ensure_user_keys(&user).await
    }
}
