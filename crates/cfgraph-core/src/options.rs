//! Engine options
//!
//! Options are read from a small TOML file:
//!
//! ```toml
//! environment = "staging"
//! cache_mode = "skip"
//! resolver_timeout_ms = 5000
//! max_init_batches = 8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// How the resolver cache is used during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Read cached values and write new ones
    #[default]
    Enabled,
    /// Ignore the cache completely
    Skip,
    /// Reset the cache before resolving, then use it normally
    Clear,
}

/// Options controlling one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Current runtime environment, consulted by environment-scoped override sources
    pub environment: Option<String>,

    pub cache_mode: CacheMode,

    /// Opt-in limit for a single resolver function. Unset means resolvers
    /// may run indefinitely.
    pub resolver_timeout_ms: Option<u64>,

    /// Upper bound on initialization batches. The queue always stops when a
    /// batch makes no progress, regardless of this limit.
    pub max_init_batches: Option<usize>,
}

impl EngineOptions {
    /// Parse options from TOML content.
    ///
    /// # Example
    ///
    /// ```
    /// use cfgraph_core::{CacheMode, EngineOptions};
    ///
    /// let options = EngineOptions::parse(r#"
    /// environment = "production"
    /// cache_mode = "clear"
    /// "#).unwrap();
    ///
    /// assert_eq!(options.environment.as_deref(), Some("production"));
    /// assert_eq!(options.cache_mode, CacheMode::Clear);
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let options: EngineOptions = toml::from_str(content)?;
        Ok(options)
    }

    /// Load options from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::debug!(?path, "No engine options file found, using defaults");
            return Ok(Self::default());
        }
        tracing::debug!(?path, "Loading engine options");
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn resolver_timeout(&self) -> Option<Duration> {
        self.resolver_timeout_ms.map(Duration::from_millis)
    }
}
