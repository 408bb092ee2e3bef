//! Configuration graph engine for cfgraph
//!
//! This crate turns per-service configuration schemas into a resolved,
//! validated configuration graph, implementing:
//!
//! - **Resolvers**: static values, async functions, conditional branches,
//!   cross-service picks and plugin lookups, with optional caching
//! - **Config nodes**: the override, resolve, coerce, validate pipeline for
//!   a single item
//! - **Service graph**: parent and pick dependencies, cycle detection and
//!   the processing order
//! - **Plugins**: input binding by path or by type injection, plus the
//!   initialization retry queue
//! - **Workspace**: the two-phase build and resolve protocol
//!
//! # Architecture
//!
//! ```text
//!                  Workspace
//!                      |
//!       +--------+-----+------+---------+
//!       |        |            |         |
//!    Service  ServiceGraph  Plugins  Overrides
//!       |
//!   ConfigNode -- Resolver -- Cache
//!       |
//!  cfgraph-types (DataType chains)
//! ```

pub mod cache;
pub mod context;
pub mod env;
pub mod error;
pub mod graph;
pub mod init;
pub mod logging;
pub mod node;
pub mod options;
pub mod overrides;
pub mod plugin;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod serialize;
pub mod service;
pub mod workspace;

pub use cache::{CacheLocks, CacheProvider, JsonFileCache, MemoryCache};
pub use context::{ResolverContext, ValueStore};
pub use env::{InjectedEnvVar, env_string};
pub use error::{ConfigLoadError, Error, ResolutionError, Result, SchemaError};
pub use graph::{EdgeKind, ServiceEdge, ServiceGraph};
pub use init::{InitOutcome, InitQueue};
pub use node::{ConfigNode, NodePhase};
pub use options::{CacheMode, EngineOptions};
pub use overrides::{AppliedOverride, Enabled, OverrideKind, OverrideSource, OverrideStack};
pub use plugin::{
    InputBinding, InputSource, InputState, PluginDeclaration, PluginHandle, PluginInputSchema,
    PluginInstance, PluginProvider, PluginRegistry,
};
pub use report::{FailureKind, FailureStanza};
pub use resolver::{
    BoxError, Branch, DEFAULT_BRANCH_LABEL, Resolver, ResolverOutput, ResolverState, TransformFn,
};
pub use schema::{
    ConfigItemSchema, PickKeys, PickRename, PickSpec, ServiceConfigSchema, ServiceDefinition,
};
pub use serialize::{
    SerializedConfigNode, SerializedDataType, SerializedError, SerializedPlugin,
    SerializedPluginInput, SerializedService, SerializedWorkspace,
};
pub use service::Service;
pub use workspace::{Workspace, WorkspaceBuilder};

pub use cfgraph_types as types;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_unknown_service_displays_name() {
        let error = Error::UnknownService("billing".into());
        let display = error.to_string();
        assert!(
            display.contains("billing"),
            "Error display should contain the service name, got: {}",
            display
        );
    }
}
