//! Persisted rule store collaborators.
//!
//! The relay is the only reader; the panel writes a full snapshot and then
//! sends `UPDATE_STORE` so the relay re-reads it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::model::RuleStore;

#[async_trait]
pub trait RuleStoreBackend: Send + Sync {
    /// Current snapshot, or the default empty store when nothing is persisted.
    async fn load(&self) -> Result<RuleStore, StoreError>;

    /// Replace the persisted snapshot; visible to the next `load`.
    async fn save(&self, store: &RuleStore) -> Result<(), StoreError>;

    /// Interception flag for an origin host; `None` when never set.
    async fn is_active(&self, host: &str) -> Result<Option<bool>, StoreError>;

    async fn set_active(&self, host: &str, active: bool) -> Result<(), StoreError>;
}

/// Everything a backend persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageDocument {
    #[serde(default)]
    pub store: Option<RuleStore>,
    #[serde(default)]
    pub active: BTreeMap<String, bool>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<StorageDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: RuleStore) -> Self {
        Self {
            document: RwLock::new(StorageDocument {
                store: Some(store),
                active: BTreeMap::new(),
            }),
        }
    }
}

#[async_trait]
impl RuleStoreBackend for MemoryStore {
    async fn load(&self) -> Result<RuleStore, StoreError> {
        Ok(self.document.read().await.store.clone().unwrap_or_default())
    }

    async fn save(&self, store: &RuleStore) -> Result<(), StoreError> {
        self.document.write().await.store = Some(store.clone());
        Ok(())
    }

    async fn is_active(&self, host: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.document.read().await.active.get(host).copied())
    }

    async fn set_active(&self, host: &str, active: bool) -> Result<(), StoreError> {
        self.document.write().await.active.insert(host.to_string(), active);
        Ok(())
    }
}

/// JSON document on disk. A missing file reads as an empty document; writes
/// go through a temporary file and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StorageDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(StorageDocument::default()),
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store document at {}, using defaults", self.path.display());
                Ok(StorageDocument::default())
            }
            Err(source) => Err(self.io_error(source)),
        }
    }

    async fn write_document(&self, document: &StorageDocument) -> Result<(), StoreError> {
        let raw = serde_json::to_vec_pretty(document)?;
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, raw)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|source| self.io_error(source))
    }

    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StorageDocument) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        change(&mut document);
        self.write_document(&document).await
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl RuleStoreBackend for JsonFileStore {
    async fn load(&self) -> Result<RuleStore, StoreError> {
        Ok(self.read_document().await?.store.unwrap_or_default())
    }

    async fn save(&self, store: &RuleStore) -> Result<(), StoreError> {
        let store = store.clone();
        self.update(move |document| document.store = Some(store)).await
    }

    async fn is_active(&self, host: &str) -> Result<Option<bool>, StoreError> {
        Ok(self.read_document().await?.active.get(host).copied())
    }

    async fn set_active(&self, host: &str, active: bool) -> Result<(), StoreError> {
        let host = host.to_string();
        self.update(move |document| {
            document.active.insert(host, active);
        })
        .await
    }
}
