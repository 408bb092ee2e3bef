//! A cache provider that records its traffic.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cfgraph_core::{CacheProvider, MemoryCache, Result};
use serde_json::Value;

/// In-memory cache counting lookups, hits and writes.
#[derive(Debug, Default)]
pub struct RecordingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    hits: AtomicUsize,
    sets: AtomicUsize,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheProvider for RecordingCache {
    async fn load(&self) -> Result<()> {
        self.inner.load().await
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let value = self.inner.get(key).await;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        value
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }
}
