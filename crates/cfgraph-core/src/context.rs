//! Context handed to resolver functions
//!
//! A [`ResolverContext`] is a cheap, cloneable snapshot of everything a
//! resolver may read: values already resolved in this pass, the plugins
//! available to the service, the cache, and the runtime environment.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CacheLocks, CacheProvider};
use crate::plugin::PluginHandle;

/// Resolved values of a pass, keyed by service then item key.
///
/// Only items that produced a coerced value are recorded; a failed item
/// is simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    services: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service: &str, key: &str, value: Value) {
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn get(&self, service: &str, key: &str) -> Option<&Value> {
        self.services.get(service)?.get(key)
    }

    pub fn service(&self, service: &str) -> Option<&BTreeMap<String, Value>> {
        self.services.get(service)
    }
}

/// Read-only view passed to every resolver invocation.
#[derive(Clone)]
pub struct ResolverContext {
    service: String,
    key: String,
    values: Arc<ValueStore>,
    plugins: Arc<BTreeMap<String, PluginHandle>>,
    cache: Option<Arc<dyn CacheProvider>>,
    locks: CacheLocks,
    environment: Option<String>,
    timeout: Option<Duration>,
    pending: Arc<BTreeSet<String>>,
}

impl ResolverContext {
    /// A context for resolving `key` in `service` with nothing else available.
    pub fn new(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            key: key.into(),
            values: Arc::new(ValueStore::new()),
            plugins: Arc::new(BTreeMap::new()),
            cache: None,
            locks: CacheLocks::new(),
            environment: None,
            timeout: None,
            pending: Arc::new(BTreeSet::new()),
        }
    }

    pub fn with_values(mut self, values: Arc<ValueStore>) -> Self {
        self.values = values;
        self
    }

    /// Record a sibling value in this context's service.
    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        let service = self.service.clone();
        Arc::make_mut(&mut self.values).insert(&service, key, value);
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<BTreeMap<String, PluginHandle>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_locks(mut self, locks: CacheLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sibling keys of this service that have not been processed yet this pass.
    pub fn with_pending(mut self, pending: Arc<BTreeSet<String>>) -> Self {
        self.pending = pending;
        self
    }

    /// The same context, pointed at another item.
    pub fn for_key(&self, service: &str, key: &str) -> Self {
        let mut ctx = self.clone();
        if ctx.service != service {
            ctx.pending = Arc::new(BTreeSet::new());
        }
        ctx.service = service.to_string();
        ctx.key = key.to_string();
        ctx
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Full path of the item being resolved, `service.key`.
    pub fn path(&self) -> String {
        format!("{}.{}", self.service, self.key)
    }

    /// A sibling value in the same service, if it has already resolved.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&self.service, key)
    }

    /// A resolved value from any service.
    pub fn get_path(&self, service: &str, key: &str) -> Option<&Value> {
        self.values.get(service, key)
    }

    /// Whether a sibling is still waiting to be resolved, as opposed to
    /// resolved or failed.
    pub fn is_pending_sibling(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn plugin(&self, instance_id: &str) -> Option<&PluginHandle> {
        self.plugins.get(instance_id)
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheProvider>> {
        self.cache.as_ref()
    }

    pub fn locks(&self) -> &CacheLocks {
        &self.locks
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl std::fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverContext")
            .field("service", &self.service)
            .field("key", &self.key)
            .field("environment", &self.environment)
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("has_cache", &self.cache.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
