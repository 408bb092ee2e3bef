//! Resolver cache providers
//!
//! The engine only needs get/set-by-key; storage is up to the provider.
//! [`CacheLocks`] serializes work per key so at most one computation
//! populates a given key even if resolvers run concurrently.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Error, Result};

/// Key/value store backing resolver memoization.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Prepare the provider, e.g. read persisted entries.
    async fn load(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    /// Drop every entry.
    async fn reset(&self) -> Result<()>;
}

/// Process-local cache. Entries live as long as the provider.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// Cache persisted as a single JSON object on disk.
///
/// The file is read by [`CacheProvider::load`] and rewritten after every
/// `set` and `reset`. A missing file is an empty cache.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheProvider for JsonFileCache {
    async fn load(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.path).await? {
            tracing::debug!(path = ?self.path, "No cache file found, starting empty");
            return Ok(());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let parsed: Value = serde_json::from_str(&content)?;
        let Value::Object(map) = parsed else {
            return Err(Error::CacheCorrupt {
                path: self.path.clone(),
                message: "expected a JSON object".to_string(),
            });
        };
        let mut entries = self.entries.lock().await;
        *entries = map.into_iter().collect();
        tracing::debug!(path = ?self.path, count = entries.len(), "Loaded cache file");
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn reset(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::remove_file(&self.path).await?;
        }
        Ok(())
    }
}

/// Per-key async locks shared by every resolver in a pass.
#[derive(Debug, Clone, Default)]
pub struct CacheLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CacheLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder has `key`, then hold it until the guard drops.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
