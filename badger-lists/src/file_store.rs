//! JSON-file backed [`SecureStore`].
//!
//! The whole store is one JSON object of name to value. Writes go to a
//! temporary sibling file that is then renamed over the original, so a
//! crash leaves either the old or the new contents.

use crate::error::{ListError, ListResult};
use crate::store::SecureStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Secure store persisted to a single JSON file.
pub struct FileSecureStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> ListResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| ListError::LocalStore(format!("corrupted store file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ListError::LocalStore(e.to_string())),
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> ListResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ListError::LocalStore(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(values)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| ListError::LocalStore(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| ListError::LocalStore(e.to_string()))?;

        debug!("saved {} secure store entries to {}", values.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, name: &str) -> ListResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(name))
    }

    async fn put(&self, name: &str, value: &str) -> ListResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(name.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn remove(&self, name: &str) -> ListResult<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(name).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }
}
