//! Per-list content keys and their per-user wrap entries.
//!
//! Access to a list is exactly the set of users holding a usable wrap entry.
//! An entry is usable when its `key_version` equals the version recorded in
//! the list's [`ListKeyState`]; anything else resolves to
//! [`ListError::KeyNotFound`]. Writing the key state is the commit point of
//! creation and rotation, so an interrupted rotation never exposes a
//! half-distributed key and a share racing a rotation fails closed.
//!
//! A rotation stages the next key beside each holder's committed wrap and
//! only promotes it once the key state is written. Until promotion the
//! staged wrap is what resolves, so a failure on either side of the commit
//! leaves every holder with a usable key.
//!
//! Each rotation seals the outgoing key under the incoming one and appends
//! it to the state's history. Current key holders can walk that chain back
//! to read content written before the rotation.

use crate::error::{ListError, ListResult};
use crate::key_service::KeyService;
use crate::store::{DocumentStore, IdentityProvider};
use crate::types::{KeyLink, ListKeyState, PendingWrap, WrapEntry};
use badger_crypto::{
    decrypt_string, encrypt_string, generate_random_key, key_id, PublicKey, SymmetricKey,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn link_context(list_id: &str, version: u64) -> String {
    format!("list:{list_id}:key:{version}")
}

/// A list content key together with the version it was issued under.
#[derive(Clone, Debug)]
pub struct ListKey {
    pub key: SymmetricKey,
    pub version: u64,
}

/// Outcome of [`ListKeyStore::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Members whose wrap entry was missing, stale, or sealed to an old
    /// public key, and has been rewritten.
    pub rewrapped: Vec<String>,
    /// Users holding a wrap entry without being members; entry deleted.
    pub removed: Vec<String>,
    /// Members without a published public key; nothing could be written.
    pub pending: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.rewrapped.is_empty() && self.removed.is_empty() && self.pending.is_empty()
    }
}

/// Creates, distributes, rotates and revokes list content keys.
pub struct ListKeyStore {
    remote: Arc<dyn DocumentStore>,
    keys: Arc<KeyService>,
    identity: Arc<dyn IdentityProvider>,
}

impl ListKeyStore {
    pub fn new(
        remote: Arc<dyn DocumentStore>,
        keys: Arc<KeyService>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            remote,
            keys,
            identity,
        }
    }

    pub fn key_service(&self) -> &Arc<KeyService> {
        &self.keys
    }

    fn current_user(&self) -> ListResult<String> {
        self.identity
            .current_user_id()
            .ok_or(ListError::NotAuthenticated)
    }

    /// Unwraps the current user's entry and checks it against the key state.
    async fn resolve(&self, list_id: &str, user_id: &str) -> ListResult<(ListKey, ListKeyState)> {
        let not_found = || ListError::KeyNotFound {
            list_id: list_id.to_string(),
        };

        let state = self
            .remote
            .get_key_state(list_id)
            .await?
            .ok_or_else(not_found)?;
        let stored = self
            .remote
            .get_wrap_entry(list_id, user_id)
            .await?
            .ok_or_else(not_found)?;

        let Some(entry) = stored.at_version(state.key_version) else {
            debug!(
                "wrap entry for {user_id} on list {list_id} is stale (v{} vs v{})",
                stored.key_version, state.key_version
            );
            return Err(not_found());
        };

        let key = self.keys.unwrap(&entry.wrapped_key, user_id).await?;
        Ok((
            ListKey {
                key,
                version: state.key_version,
            },
            state,
        ))
    }

    fn entry_for(
        &self,
        list_id: &str,
        user_id: &str,
        recipient: &PublicKey,
        key: &ListKey,
        wrapped_by: &str,
    ) -> ListResult<WrapEntry> {
        Ok(WrapEntry {
            list_id: list_id.to_string(),
            user_id: user_id.to_string(),
            wrapped_key: self.keys.wrap(&key.key, recipient)?,
            key_version: key.version,
            recipient_key_id: key_id(recipient),
            wrapped_by: wrapped_by.to_string(),
            created_at: Utc::now(),
            pending: None,
        })
    }

    async fn wrap_entry_for(
        &self,
        list_id: &str,
        user_id: &str,
        recipient: &PublicKey,
        key: &ListKey,
        wrapped_by: &str,
    ) -> ListResult<()> {
        let entry = self.entry_for(list_id, user_id, recipient, key, wrapped_by)?;
        self.remote.put_wrap_entry(&entry).await
    }

    /// Generates the first content key of a new list and wraps it for the
    /// current user.
    pub async fn create_key(&self, list_id: &str) -> ListResult<ListKey> {
        let user = self.current_user()?;
        if self.remote.get_key_state(list_id).await?.is_some() {
            return Err(ListError::InvalidArgument(format!(
                "list {list_id} already has a key"
            )));
        }

        let own = self.keys.retrieve_private_key(&user).await?;
        let key = ListKey {
            key: generate_random_key(),
            version: 1,
        };

        self.wrap_entry_for(list_id, &user, &own.public, &key, &user)
            .await?;
        self.remote
            .put_key_state(&ListKeyState {
                list_id: list_id.to_string(),
                key_version: key.version,
                rotated_by: user.clone(),
                rotated_at: Utc::now(),
                history: Vec::new(),
            })
            .await?;

        info!("created key for list {list_id}");
        Ok(key)
    }

    /// Returns the current content key for the signed-in user.
    pub async fn get_key(&self, list_id: &str) -> ListResult<ListKey> {
        let user = self.current_user()?;
        let (key, _) = self.resolve(list_id, &user).await?;
        Ok(key)
    }

    /// Returns the content key of an older `version` by walking the
    /// rotation history down from the current key.
    pub async fn key_for_version(&self, list_id: &str, version: u64) -> ListResult<ListKey> {
        let user = self.current_user()?;
        let (current, state) = self.resolve(list_id, &user).await?;

        if version == current.version {
            return Ok(current);
        }
        if version > current.version {
            warn!(
                "list {list_id} content claims key v{version} but current key is v{}",
                current.version
            );
            return Err(ListError::KeyNotFound {
                list_id: list_id.to_string(),
            });
        }

        let mut key = current.key;
        for v in (version..current.version).rev() {
            let link = state
                .history
                .iter()
                .find(|link| link.version == v)
                .ok_or_else(|| ListError::KeyNotFound {
                    list_id: list_id.to_string(),
                })?;
            let context = link_context(list_id, v);
            let encoded = decrypt_string(&key, &link.sealed_key, Some(context.as_str()))?;
            key = SymmetricKey::from_base64(&encoded)?;
        }

        Ok(ListKey { key, version })
    }

    /// Wraps the current key for `target_user_id`. Re-sharing with an
    /// existing holder rewrites their entry.
    pub async fn share_with(&self, list_id: &str, target_user_id: &str) -> ListResult<()> {
        let user = self.current_user()?;
        let (current, _) = self.resolve(list_id, &user).await?;

        let recipient = self
            .keys
            .fetch_public_key(target_user_id)
            .await?
            .ok_or_else(|| ListError::RecipientKeyUnavailable {
                user_id: target_user_id.to_string(),
            })?;

        self.wrap_entry_for(list_id, target_user_id, &recipient, &current, &user)
            .await?;
        info!("shared list {list_id} key v{} with {target_user_id}", current.version);
        Ok(())
    }

    /// Deletes a user's wrap entry. Prospective only: a key the user already
    /// unwrapped stays valid for content written before the next rotation.
    pub async fn revoke(&self, list_id: &str, user_id: &str) -> ListResult<()> {
        let by = self.current_user()?;
        self.remote.delete_wrap_entry(list_id, user_id).await?;
        info!("revoked {user_id} from list {list_id} (by {by})");
        Ok(())
    }

    /// Replaces the list key with a fresh one wrapped for exactly
    /// `authorized_user_ids`, and purges every other entry.
    ///
    /// Safe to retry after any failure. Holders of the current key get the
    /// next one staged beside it; the key state write commits, and only
    /// then are staged wraps promoted and outsiders purged.
    pub async fn rotate(&self, list_id: &str, authorized_user_ids: &[String]) -> ListResult<ListKey> {
        let user = self.current_user()?;

        let current = match self.remote.get_key_state(list_id).await? {
            Some(_) => Some(self.resolve(list_id, &user).await?),
            None => None,
        };

        let next = ListKey {
            key: generate_random_key(),
            version: current.as_ref().map_or(1, |(key, _)| key.version + 1),
        };

        let mut history = Vec::new();
        if let Some((old, state)) = &current {
            history = state.history.clone();
            history.push(KeyLink {
                version: old.version,
                sealed_key: encrypt_string(
                    &next.key,
                    &old.key.to_base64(),
                    Some(link_context(list_id, old.version).as_str()),
                )?,
            });
        }

        let mut authorized: Vec<&str> = Vec::new();
        for id in authorized_user_ids {
            if !authorized.contains(&id.as_str()) {
                authorized.push(id);
            }
        }
        authorized.sort_by_key(|id| *id == user);

        let mut recipients = Vec::with_capacity(authorized.len());
        for id in &authorized {
            let public = self
                .keys
                .fetch_public_key(id)
                .await?
                .ok_or_else(|| ListError::RecipientKeyUnavailable {
                    user_id: id.to_string(),
                })?;
            recipients.push((*id, public));
        }

        let committed = current.as_ref().map(|(key, _)| key.version);
        let existing = self.remote.list_wrap_entries(list_id).await?;
        let mut promotions = Vec::new();

        for (id, public) in &recipients {
            let next_entry = self.entry_for(list_id, id, public, &next, &user)?;
            let held = committed.and_then(|version| {
                existing
                    .iter()
                    .find(|e| e.user_id == *id)
                    .and_then(|e| e.at_version(version))
            });
            match held {
                Some(held) => {
                    self.remote
                        .put_wrap_entry(&WrapEntry {
                            pending: Some(PendingWrap::from(&next_entry)),
                            ..held
                        })
                        .await?;
                    promotions.push(next_entry);
                }
                None => self.remote.put_wrap_entry(&next_entry).await?,
            }
        }

        self.remote
            .put_key_state(&ListKeyState {
                list_id: list_id.to_string(),
                key_version: next.version,
                rotated_by: user.clone(),
                rotated_at: Utc::now(),
                history,
            })
            .await?;

        for entry in &promotions {
            self.remote.put_wrap_entry(entry).await?;
        }

        for entry in self.remote.list_wrap_entries(list_id).await? {
            if !authorized.contains(&entry.user_id.as_str()) {
                self.remote
                    .delete_wrap_entry(list_id, &entry.user_id)
                    .await?;
                debug!("purged wrap entry for {} on list {list_id}", entry.user_id);
            }
        }

        info!(
            "rotated list {list_id} to key v{} for {} users",
            next.version,
            authorized.len()
        );
        Ok(next)
    }

    /// Brings wrap entries in line with `members`: every member with a
    /// published key gets a usable entry, and non-members lose theirs.
    pub async fn reconcile(&self, list_id: &str, members: &[String]) -> ListResult<ReconcileReport> {
        let user = self.current_user()?;
        let (current, _) = self.resolve(list_id, &user).await?;
        let entries = self.remote.list_wrap_entries(list_id).await?;
        let mut report = ReconcileReport::default();

        for member in members {
            let Some(public) = self.keys.fetch_public_key(member).await? else {
                report.pending.push(member.clone());
                continue;
            };
            let published_id = key_id(&public);
            let usable = entries.iter().any(|e| {
                e.user_id == *member
                    && e.key_version == current.version
                    && e.recipient_key_id == published_id
            });
            if !usable {
                self.wrap_entry_for(list_id, member, &public, &current, &user)
                    .await?;
                report.rewrapped.push(member.clone());
            }
        }

        for entry in &entries {
            if !members.contains(&entry.user_id) {
                self.remote
                    .delete_wrap_entry(list_id, &entry.user_id)
                    .await?;
                report.removed.push(entry.user_id.clone());
            }
        }

        if !report.is_clean() {
            info!(
                "reconciled list {list_id}: {} rewrapped, {} removed, {} pending",
                report.rewrapped.len(),
                report.removed.len(),
                report.pending.len()
            );
        }
        Ok(report)
    }

    /// Deletes every wrap entry and the key state of a list.
    pub async fn delete_all(&self, list_id: &str) -> ListResult<()> {
        for entry in self.remote.list_wrap_entries(list_id).await? {
            self.remote
                .delete_wrap_entry(list_id, &entry.user_id)
                .await?;
        }
        self.remote.delete_key_state(list_id).await?;
        debug!("deleted key material for list {list_id}");
        Ok(())
    }

    pub async fn entries(&self, list_id: &str) -> ListResult<Vec<WrapEntry>> {
        self.remote.list_wrap_entries(list_id).await
    }
}
