//! Error types for cfgraph-core
//!
//! [`Error`] is returned from API calls that can genuinely fail (file I/O,
//! malformed override or option files). Everything that can go wrong with a
//! single service or item is recorded on it instead:
//!
//! - [`SchemaError`]: structural problems found at definition time
//! - [`ResolutionError`]: the value-producing computation failed
//! - [`ConfigLoadError`]: the host could not load a schema at all
//! - `ValidationError` / `CoercionError`: re-exported from `cfgraph-types`

use std::path::PathBuf;

use cfgraph_types::TypeError;
use serde::{Deserialize, Serialize};

/// Result type for cfgraph-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by cfgraph-core APIs
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An override source could not be parsed
    #[error("Failed to parse override source '{label}': {message}")]
    OverrideParse { label: String, message: String },

    /// The on-disk cache held something other than a JSON object
    #[error("Cache file at {path} is corrupt: {message}")]
    CacheCorrupt { path: PathBuf, message: String },

    /// A service name did not match any service in the workspace
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Type construction error from cfgraph-types
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

/// Structural problems recorded on a service, node or plugin.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("duplicate service name '{name}'")]
    DuplicateService { name: String },

    #[error("service '{name}' is marked root but '{existing}' is already the root")]
    MultipleRoots { name: String, existing: String },

    #[error("parent service '{parent}' does not exist")]
    MissingParent { parent: String },

    #[error("pick source service '{service}' does not exist")]
    MissingPickSource { service: String },

    #[error("picked item '{key}' does not exist in service '{service}'")]
    MissingPickedItem { service: String, key: String },

    #[error("renaming a pick to a fixed key requires exactly one picked key")]
    InvalidPickRename,

    #[error("duplicate config key '{key}'")]
    DuplicateKey { key: String },

    #[error("dependency cycle detected between services: {}", members.join(", "))]
    DependencyCycle { members: Vec<String> },

    #[error("plugin instance '{instance_id}' is already registered")]
    DuplicatePlugin { instance_id: String },

    #[error("injection target '{target}' does not exist")]
    InjectionTargetMissing { target: String },

    #[error("plugin '{instance_id}' input '{input}' is invalid: {reason}")]
    InvalidPluginInput {
        instance_id: String,
        input: String,
        reason: String,
    },
}

impl SchemaError {
    /// Whether this error may clear up once more services are initialized.
    pub fn is_injection_target_missing(&self) -> bool {
        matches!(self, Self::InjectionTargetMissing { .. })
    }
}

/// Failure of a resolver's computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no matching branch and no default")]
    NoMatchingBranch,

    #[error("switch key '{key}' has not been resolved yet")]
    SiblingUnresolved { key: String },

    #[error("picked value has not been resolved yet: {service}.{key}")]
    PickedValueUnresolved { service: String, key: String },

    #[error("resolver failed: {message}")]
    Failed { message: String },

    #[error("resolver timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("plugin '{instance_id}' is not available to this service")]
    PluginMissing { instance_id: String },

    #[error("plugin '{instance_id}' is not ready, missing inputs: {}", missing.join(", "))]
    PluginNotReady {
        instance_id: String,
        missing: Vec<String>,
    },

    #[error("plugin '{instance_id}' failed: {message}")]
    PluginFailed { instance_id: String, message: String },
}

/// The host failed to load a service's schema before the engine saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("failed to load config schema: {message}")]
pub struct ConfigLoadError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ConfigLoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}
