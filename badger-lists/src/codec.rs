//! Field-level encryption of list content.
//!
//! Only the list title and item content are encrypted. Each ciphertext is
//! bound to its location (`list:{id}:title`, `list:{id}:item:{item_id}`),
//! so a blob moved to another field, item, or list fails to decrypt.

use crate::error::{ListError, ListResult};
use crate::key_store::ListKey;
use crate::types::{EncryptedListItem, EncryptedListRecord, ListItem, SharedList};
use badger_crypto::{decrypt_string, encrypt_string};

pub fn title_context(list_id: &str) -> String {
    format!("list:{list_id}:title")
}

pub fn item_context(list_id: &str, item_id: &str) -> String {
    format!("list:{list_id}:item:{item_id}")
}

pub fn encrypt_item(list_id: &str, item: &ListItem, key: &ListKey) -> ListResult<EncryptedListItem> {
    let context = item_context(list_id, &item.id);
    Ok(EncryptedListItem {
        id: item.id.clone(),
        content: encrypt_string(&key.key, &item.content, Some(context.as_str()))?,
        is_completed: item.is_completed,
        priority: item.priority,
        created_by: item.created_by.clone(),
        created_at: item.created_at,
        completed_by: item.completed_by.clone(),
        completed_at: item.completed_at,
    })
}

pub fn decrypt_item(list_id: &str, item: &EncryptedListItem, key: &ListKey) -> ListResult<ListItem> {
    let context = item_context(list_id, &item.id);
    Ok(ListItem {
        id: item.id.clone(),
        content: decrypt_string(&key.key, &item.content, Some(context.as_str()))?,
        is_completed: item.is_completed,
        priority: item.priority,
        created_by: item.created_by.clone(),
        created_at: item.created_at,
        completed_by: item.completed_by.clone(),
        completed_at: item.completed_at,
    })
}

/// Encrypts title and item content. Plaintext metadata is copied through and
/// the record is stamped with the key's version.
pub fn encrypt_list(list: &SharedList, key: &ListKey) -> ListResult<EncryptedListRecord> {
    let context = title_context(&list.id);
    let items = list
        .items
        .iter()
        .map(|item| encrypt_item(&list.id, item, key))
        .collect::<ListResult<Vec<_>>>()?;

    Ok(EncryptedListRecord {
        id: list.id.clone(),
        title: encrypt_string(&key.key, &list.title, Some(context.as_str()))?,
        created_by: list.created_by.clone(),
        created_at: list.created_at,
        last_modified_by: list.last_modified_by.clone(),
        last_modified_at: list.last_modified_at,
        shared_with_users: list.shared_with_users.clone(),
        items,
        is_favorite: list.is_favorite,
        key_version: key.version,
    })
}

/// Decrypts a record. Fails with `AuthenticationFailure` if the record was
/// written under a different key version or any field fails to verify.
pub fn decrypt_list(record: &EncryptedListRecord, key: &ListKey) -> ListResult<SharedList> {
    if record.key_version != key.version {
        return Err(ListError::AuthenticationFailure(format!(
            "list {} is encrypted under key v{}, not v{}",
            record.id, record.key_version, key.version
        )));
    }

    let context = title_context(&record.id);
    let items = record
        .items
        .iter()
        .map(|item| decrypt_item(&record.id, item, key))
        .collect::<ListResult<Vec<_>>>()?;

    Ok(SharedList {
        id: record.id.clone(),
        title: decrypt_string(&key.key, &record.title, Some(context.as_str()))?,
        created_by: record.created_by.clone(),
        created_at: record.created_at,
        last_modified_by: record.last_modified_by.clone(),
        last_modified_at: record.last_modified_at,
        shared_with_users: record.shared_with_users.clone(),
        items,
        is_favorite: record.is_favorite,
        is_locked: false,
    })
}

/// Placeholder view of a record that cannot be decrypted.
pub fn locked_list(record: &EncryptedListRecord, locked_title: &str) -> SharedList {
    SharedList {
        id: record.id.clone(),
        title: locked_title.to_string(),
        created_by: record.created_by.clone(),
        created_at: record.created_at,
        last_modified_by: record.last_modified_by.clone(),
        last_modified_at: record.last_modified_at,
        shared_with_users: record.shared_with_users.clone(),
        items: Vec::new(),
        is_favorite: record.is_favorite,
        is_locked: true,
    }
}
