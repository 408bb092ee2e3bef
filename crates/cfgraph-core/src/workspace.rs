//! Workspace orchestration
//!
//! Building a [`Workspace`] is phase one: services are checked, the service
//! graph is analyzed, plugins are initialized through the retry queue, and
//! every config node is created with its type chain. Nothing is resolved.
//!
//! [`Workspace::resolve`] is phase two: services are walked in dependency
//! order, each node runs its pipeline, and every valid node is offered to
//! the plugins so pending inputs can bind.
//!
//! # Example
//!
//! ```
//! use cfgraph_core::{
//!     ConfigItemSchema, Resolver, ServiceConfigSchema, ServiceDefinition, WorkspaceBuilder,
//! };
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let mut workspace = WorkspaceBuilder::new()
//!     .service(ServiceDefinition::root(
//!         "root",
//!         ServiceConfigSchema::new().item(
//!             "PORT",
//!             ConfigItemSchema::new().extends("port").value(Resolver::static_value("8080")),
//!         ),
//!     ))
//!     .build();
//! workspace.resolve().await.unwrap();
//!
//! assert_eq!(workspace.value("root", "PORT"), Some(&json!(8080)));
//! assert!(workspace.is_valid());
//! # });
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cfgraph_types::{TypeFactory, TypeRegistry};
use indexmap::IndexMap;
use serde_json::Value;

use crate::cache::{CacheLocks, CacheProvider, MemoryCache};
use crate::context::{ResolverContext, ValueStore};
use crate::env::{InjectedEnvVar, env_for_service};
use crate::error::SchemaError;
use crate::graph::{EdgeKind, ServiceGraph};
use crate::init::{InitOutcome, InitQueue};
use crate::options::{CacheMode, EngineOptions};
use crate::overrides::OverrideStack;
use crate::plugin::{InputSource, PluginInstance, PluginRegistry};
use crate::report::{FailureStanza, plugin_failure, service_failures};
use crate::schema::ServiceDefinition;
use crate::serialize::SerializedWorkspace;
use crate::service::{Service, picked_nodes};
use crate::{Error, Result};

/// Name used in errors when a service needs the root and there is none.
const ROOT_PLACEHOLDER: &str = "(root)";

/// Collects everything a workspace is built from.
pub struct WorkspaceBuilder {
    definitions: Vec<ServiceDefinition>,
    types: TypeRegistry,
    options: EngineOptions,
    cache: Arc<dyn CacheProvider>,
    overrides: BTreeMap<String, OverrideStack>,
}

impl Default for WorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceBuilder {
    /// Built-in types, default options and an in-memory cache.
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            types: TypeRegistry::with_builtins(),
            options: EngineOptions::default(),
            cache: Arc::new(MemoryCache::new()),
            overrides: BTreeMap::new(),
        }
    }

    pub fn service(mut self, definition: ServiceDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn services(mut self, definitions: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        self.definitions.extend(definitions);
        self
    }

    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn register_type(mut self, factory: TypeFactory) -> Self {
        self.types.register(factory);
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheProvider>) -> Self {
        self.cache = cache;
        self
    }

    /// Override sources for one service.
    pub fn overrides(mut self, service: impl Into<String>, stack: OverrideStack) -> Self {
        self.overrides.insert(service.into(), stack);
        self
    }

    /// Run phase one and return the unresolved workspace.
    pub fn build(self) -> Workspace {
        let mut services = collect_services(self.definitions);
        let root = assign_root(&mut services);
        assign_parents(&mut services, root.as_deref());

        let graph = build_graph(&mut services, root.as_deref());
        let mut plugins = PluginRegistry::new();
        let init = initialize_plugins(&mut services, &mut plugins, &self.types, &self.options);
        build_nodes(&mut services, &graph, root.as_deref(), &self.types);

        tracing::info!(
            services = services.len(),
            plugins = plugins.len(),
            cycles = graph.cycles().len(),
            "Workspace built"
        );

        Workspace {
            services,
            root,
            graph,
            plugins,
            types: self.types,
            options: self.options,
            cache: self.cache,
            overrides: self.overrides,
            values: Arc::new(ValueStore::new()),
            locks: CacheLocks::new(),
            init,
        }
    }
}

fn collect_services(definitions: Vec<ServiceDefinition>) -> IndexMap<String, Service> {
    let mut services: IndexMap<String, Service> = IndexMap::new();
    for definition in definitions {
        let name = definition.service_name.clone();
        if let Some(existing) = services.get_mut(&name) {
            tracing::warn!(service = %name, "Duplicate service name");
            existing.push_schema_error(SchemaError::DuplicateService { name });
            continue;
        }
        services.insert(name, Service::from_definition(definition));
    }
    services
}

fn assign_root(services: &mut IndexMap<String, Service>) -> Option<String> {
    let mut root: Option<String> = None;
    for service in services.values_mut().filter(|s| s.is_root()) {
        match &root {
            None => root = Some(service.name().to_string()),
            Some(existing) => {
                service.push_schema_error(SchemaError::MultipleRoots {
                    name: service.name().to_string(),
                    existing: existing.clone(),
                });
                service.demote_root();
            }
        }
    }
    root
}

fn assign_parents(services: &mut IndexMap<String, Service>, root: Option<&str>) {
    let names: Vec<String> = services.keys().cloned().collect();
    for service in services.values_mut() {
        if service.is_root() || service.config_load_error().is_some() {
            continue;
        }
        match service.parent().map(str::to_string) {
            Some(parent) if !names.contains(&parent) => {
                service.push_schema_error(SchemaError::MissingParent { parent });
            }
            Some(_) => {}
            None => match root {
                Some(root) => service.set_parent(Some(root.to_string())),
                None => service.push_schema_error(SchemaError::MissingParent {
                    parent: ROOT_PLACEHOLDER.to_string(),
                }),
            },
        }
    }
}

fn build_graph(services: &mut IndexMap<String, Service>, root: Option<&str>) -> ServiceGraph {
    let mut graph = ServiceGraph::new();
    for name in services.keys() {
        graph.add_service(name);
    }
    for service in services.values_mut() {
        if let Some(parent) = service.parent().map(str::to_string) {
            graph.add_edge(&parent, service.name(), EdgeKind::Parent);
        }
        let mut missing = Vec::new();
        for pick in service.picks() {
            match pick.source.as_deref().or(root) {
                Some(source) => graph.add_edge(source, service.name(), EdgeKind::Pick),
                None => missing.push(ROOT_PLACEHOLDER.to_string()),
            }
        }
        for source in missing {
            service.push_schema_error(SchemaError::MissingPickSource { service: source });
        }
    }

    graph.analyze();
    for cycle in graph.cycles() {
        for member in cycle {
            if let Some(service) = services.get_mut(member) {
                service.push_schema_error(SchemaError::DependencyCycle {
                    members: cycle.clone(),
                });
            }
        }
    }
    graph
}

fn initialize_plugins(
    services: &mut IndexMap<String, Service>,
    plugins: &mut PluginRegistry,
    types: &TypeRegistry,
    options: &EngineOptions,
) -> InitOutcome {
    let queued: Vec<String> = services
        .values()
        .filter(|s| s.config_load_error().is_none())
        .map(|s| s.name().to_string())
        .collect();

    let outcome = {
        let services = &*services;
        InitQueue::new(queued)
            .with_max_batches(options.max_init_batches)
            .run(|name, done| {
                let Some(service) = services.get(name) else {
                    return Ok(());
                };
                let declarations = service.plugin_declarations();
                let mut errors = Vec::new();
                for declaration in declarations {
                    let id = &declaration.instance_id;
                    if plugins.get(id).is_some_and(|existing| existing.owner() != name) {
                        errors.push(SchemaError::DuplicatePlugin {
                            instance_id: id.clone(),
                        });
                    }
                    for source in declaration.inputs.values() {
                        let InputSource::Path(path) = source else {
                            continue;
                        };
                        let target = path.split_once('.').map_or(path.as_str(), |(s, _)| s);
                        if target != name && !done.contains(target) {
                            errors.push(SchemaError::InjectionTargetMissing {
                                target: path.clone(),
                            });
                        }
                    }
                }
                for instance_id in service.inject_plugins() {
                    let owned = declarations.iter().any(|d| &d.instance_id == instance_id);
                    if !owned && !plugins.contains(instance_id) {
                        errors.push(SchemaError::InjectionTargetMissing {
                            target: instance_id.clone(),
                        });
                    }
                }
                // nothing is registered for a service that is still waiting
                if !errors.is_empty() {
                    return Err(errors);
                }
                for declaration in declarations {
                    if let Err(err) = plugins.register(PluginInstance::new(declaration, name, types)) {
                        errors.push(err);
                    }
                }
                if errors.is_empty() { Ok(()) } else { Err(errors) }
            })
    };

    for (name, errors) in &outcome.failed {
        if let Some(service) = services.get_mut(name) {
            for err in errors {
                service.push_schema_error(err.clone());
            }
        }
    }
    outcome
}

fn build_nodes(
    services: &mut IndexMap<String, Service>,
    graph: &ServiceGraph,
    root: Option<&str>,
    types: &TypeRegistry,
) {
    // cycle members are outside the order; their own nodes must exist
    // before anything downstream picks from them
    let cyclic = graph.cycle_members();
    for service in services.values_mut() {
        if cyclic.contains(service.name()) {
            service.build_own_nodes(types);
        }
    }

    // pick sources come first in the order, so their nodes already exist
    for name in graph.topological_order() {
        let Some(service) = services.get(name) else {
            continue;
        };
        let (picked, errors) = picked_nodes(service, services, root);
        let Some(service) = services.get_mut(name) else {
            continue;
        };
        for err in errors {
            service.push_schema_error(err);
        }
        for node in picked {
            if let Err(err) = service.add_node(node) {
                service.push_schema_error(err);
            }
        }
        service.build_own_nodes(types);
    }
}

/// Services, plugins and resolved values of one build.
pub struct Workspace {
    services: IndexMap<String, Service>,
    root: Option<String>,
    graph: ServiceGraph,
    plugins: PluginRegistry,
    types: TypeRegistry,
    options: EngineOptions,
    cache: Arc<dyn CacheProvider>,
    overrides: BTreeMap<String, OverrideStack>,
    values: Arc<ValueStore>,
    locks: CacheLocks,
    init: InitOutcome,
}

impl Workspace {
    pub fn builder() -> WorkspaceBuilder {
        WorkspaceBuilder::new()
    }

    /// Run phase two. Item failures are recorded, not returned; only cache
    /// I/O can fail here.
    pub async fn resolve(&mut self) -> Result<()> {
        let cache = match self.options.cache_mode {
            CacheMode::Skip => None,
            CacheMode::Enabled => {
                self.cache.load().await?;
                Some(Arc::clone(&self.cache))
            }
            CacheMode::Clear => {
                self.cache.load().await?;
                self.cache.reset().await?;
                Some(Arc::clone(&self.cache))
            }
        };

        self.values = Arc::new(ValueStore::new());
        let empty = OverrideStack::new();
        let order: Vec<String> = self.graph.topological_order().to_vec();

        for name in &order {
            let Some(service) = self.services.get_mut(name) else {
                continue;
            };
            if service.has_service_errors() {
                tracing::debug!(service = %name, "Skipping service with schema errors");
                continue;
            }
            let plugin_ids: Vec<String> = service.plugin_ids().map(str::to_string).collect();
            let overrides = self.overrides.get(name).unwrap_or(&empty);

            let keys = service.resolution_order();
            let mut pending: BTreeSet<String> = keys.iter().cloned().collect();

            for key in &keys {
                pending.remove(key);
                let Some(node) = service.nodes_mut().get_mut(key) else {
                    continue;
                };
                let handles = self.plugins.handles(plugin_ids.iter().map(String::as_str));
                let mut ctx = ResolverContext::new(name.as_str(), key.as_str())
                    .with_values(Arc::clone(&self.values))
                    .with_pending(Arc::new(pending.clone()))
                    .with_plugins(Arc::new(handles))
                    .with_locks(self.locks.clone())
                    .with_environment(self.options.environment.clone())
                    .with_timeout(self.options.resolver_timeout());
                if let Some(cache) = &cache {
                    ctx = ctx.with_cache(Arc::clone(cache));
                }

                node.resolve(&ctx, overrides, self.options.environment.as_deref())
                    .await;
                drop(ctx);

                if !node.is_resolved() {
                    continue;
                }
                let value = node.resolved_value().cloned().unwrap_or(Value::Null);
                Arc::make_mut(&mut self.values).insert(name, node.key(), value.clone());
                if node.is_valid() {
                    self.plugins.offer(&node.path(), node.data_type(), &value);
                }
            }
        }

        let invalid = self.services.values().filter(|s| !s.is_valid()).count();
        if invalid > 0 {
            tracing::warn!(invalid, total = self.services.len(), "Resolution finished with invalid services");
        } else {
            tracing::info!(total = self.services.len(), "Resolution finished");
        }
        Ok(())
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn graph(&self) -> &ServiceGraph {
        &self.graph
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// How plugin initialization went.
    pub fn init_outcome(&self) -> &InitOutcome {
        &self.init
    }

    /// Resolved value of an item, if it produced one.
    pub fn value(&self, service: &str, key: &str) -> Option<&Value> {
        self.values.get(service, key)
    }

    /// Every service and plugin is valid.
    pub fn is_valid(&self) -> bool {
        self.services.values().all(Service::is_valid) && self.plugins.iter().all(PluginInstance::is_valid)
    }

    pub fn failures(&self) -> Vec<FailureStanza> {
        let mut stanzas: Vec<FailureStanza> = self.services.values().flat_map(service_failures).collect();
        stanzas.extend(self.plugins.iter().filter_map(plugin_failure));
        stanzas
    }

    pub fn to_serialized(&self) -> SerializedWorkspace {
        SerializedWorkspace::build(self.services.values(), &self.plugins, false)
    }

    /// Same as [`to_serialized`](Self::to_serialized) with sensitive values masked.
    pub fn to_serialized_redacted(&self) -> SerializedWorkspace {
        SerializedWorkspace::build(self.services.values(), &self.plugins, true)
    }

    pub fn env_for_service(&self, name: &str) -> Result<BTreeMap<String, InjectedEnvVar>> {
        let service = self
            .services
            .get(name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;
        Ok(env_for_service(service))
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("root", &self.root)
            .field("plugins", &self.plugins.len())
            .field("options", &self.options)
            .finish()
    }
}
