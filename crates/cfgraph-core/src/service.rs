//! Services: named groups of config nodes

use std::collections::HashSet;

use cfgraph_types::TypeRegistry;
use indexmap::IndexMap;

use crate::error::{ConfigLoadError, SchemaError};
use crate::node::ConfigNode;
use crate::plugin::PluginDeclaration;
use crate::resolver::Resolver;
use crate::schema::{ConfigItemSchema, PickRename, PickSpec, ServiceDefinition};

/// A service materialized from its definition.
#[derive(Debug)]
pub struct Service {
    name: String,
    package_name: String,
    path: String,
    is_root: bool,
    parent: Option<String>,
    picks: Vec<PickSpec>,
    items: IndexMap<String, ConfigItemSchema>,
    plugins: Vec<PluginDeclaration>,
    inject_plugins: Vec<String>,
    nodes: IndexMap<String, ConfigNode>,
    schema_errors: Vec<SchemaError>,
    config_load_error: Option<ConfigLoadError>,
}

impl Service {
    pub fn from_definition(definition: ServiceDefinition) -> Self {
        let (schema, config_load_error) = match definition.schema {
            Ok(schema) => (schema, None),
            Err(err) => (Default::default(), Some(err)),
        };
        Self {
            name: definition.service_name,
            package_name: definition.package_name,
            path: definition.path,
            is_root: definition.is_root,
            parent: schema.parent,
            picks: schema.pick,
            items: schema.schema,
            plugins: schema.plugins,
            inject_plugins: schema.inject_plugins,
            nodes: IndexMap::new(),
            schema_errors: Vec::new(),
            config_load_error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub(crate) fn demote_root(&mut self) {
        self.is_root = false;
    }

    /// Declared or implied parent service.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub(crate) fn set_parent(&mut self, parent: Option<String>) {
        self.parent = parent;
    }

    pub fn picks(&self) -> &[PickSpec] {
        &self.picks
    }

    pub fn plugin_declarations(&self) -> &[PluginDeclaration] {
        &self.plugins
    }

    pub fn inject_plugins(&self) -> &[String] {
        &self.inject_plugins
    }

    /// Ids of every plugin this service may use: its own, then injected ones.
    pub fn plugin_ids(&self) -> impl Iterator<Item = &str> {
        self.plugins
            .iter()
            .map(|p| p.instance_id.as_str())
            .chain(self.inject_plugins.iter().map(String::as_str))
    }

    pub fn nodes(&self) -> &IndexMap<String, ConfigNode> {
        &self.nodes
    }

    pub fn node(&self, key: &str) -> Option<&ConfigNode> {
        self.nodes.get(key)
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut IndexMap<String, ConfigNode> {
        &mut self.nodes
    }

    pub fn schema_errors(&self) -> &[SchemaError] {
        &self.schema_errors
    }

    pub fn config_load_error(&self) -> Option<&ConfigLoadError> {
        self.config_load_error.as_ref()
    }

    pub fn push_schema_error(&mut self, error: SchemaError) {
        if !self.schema_errors.contains(&error) {
            self.schema_errors.push(error);
        }
    }

    /// Structural problems of the service itself, excluding its nodes.
    pub fn has_service_errors(&self) -> bool {
        !self.schema_errors.is_empty() || self.config_load_error.is_some()
    }

    pub fn is_schema_valid(&self) -> bool {
        !self.has_service_errors() && self.nodes.values().all(ConfigNode::is_schema_valid)
    }

    pub fn is_valid(&self) -> bool {
        self.is_schema_valid() && self.nodes.values().all(ConfigNode::is_valid)
    }

    /// Add a node, rejecting a key that is already taken.
    pub fn add_node(&mut self, node: ConfigNode) -> Result<(), SchemaError> {
        if self.nodes.contains_key(node.key()) {
            return Err(SchemaError::DuplicateKey {
                key: node.key().to_string(),
            });
        }
        self.nodes.insert(node.key().to_string(), node);
        Ok(())
    }

    /// Materialize the service's own declared items into nodes.
    pub fn build_own_nodes(&mut self, types: &TypeRegistry) {
        let items = std::mem::take(&mut self.items);
        for (key, item) in &items {
            let node = match item.build_type(types) {
                Ok(data_type) => {
                    let resolver = item
                        .value
                        .as_ref()
                        .map(Resolver::fresh)
                        .unwrap_or_else(|| Resolver::static_value(serde_json::Value::Null));
                    ConfigNode::new(&self.name, key, data_type, resolver)
                }
                Err(err) => {
                    tracing::debug!(service = %self.name, %key, error = %err, "Invalid item type");
                    ConfigNode::invalid(&self.name, key, SchemaError::Type(err))
                }
            };
            if let Err(err) = self.add_node(node) {
                self.push_schema_error(err);
            }
        }
        self.items = items;
    }

    /// Node keys in the order they resolve: declaration order, except that
    /// an item a switch branches on is moved ahead of the switch.
    ///
    /// A cycle is broken at the key that would be entered a second time.
    pub fn resolution_order(&self) -> Vec<String> {
        fn visit<'a>(
            key: &'a str,
            nodes: &'a IndexMap<String, ConfigNode>,
            visiting: &mut HashSet<&'a str>,
            done: &mut HashSet<&'a str>,
            order: &mut Vec<String>,
        ) {
            if done.contains(key) || !visiting.insert(key) {
                return;
            }
            if let Some(node) = nodes.get(key) {
                for dependency in node.resolver().sibling_dependencies() {
                    if dependency != key {
                        visit(dependency, nodes, visiting, done, order);
                    }
                }
            }
            visiting.remove(key);
            if nodes.contains_key(key) && done.insert(key) {
                order.push(key.to_string());
            }
        }

        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for key in self.nodes.keys() {
            visit(key, &self.nodes, &mut visiting, &mut done, &mut order);
        }
        order
    }
}

/// Nodes a service receives from its picks.
///
/// `root` names the service a pick without a source reads from. Problems
/// are returned as schema errors for the picking service.
pub fn picked_nodes(
    service: &Service,
    services: &IndexMap<String, Service>,
    root: Option<&str>,
) -> (Vec<ConfigNode>, Vec<SchemaError>) {
    let mut nodes = Vec::new();
    let mut errors = Vec::new();

    for pick in service.picks() {
        let Some(source_name) = pick.source.as_deref().or(root) else {
            errors.push(SchemaError::MissingPickSource {
                service: "(root)".to_string(),
            });
            continue;
        };
        let Some(source) = services.get(source_name) else {
            errors.push(SchemaError::MissingPickSource {
                service: source_name.to_string(),
            });
            continue;
        };

        let keys = pick.keys.select(source.nodes().keys().map(String::as_str));
        if matches!(pick.rename, Some(PickRename::To(_))) && keys.len() != 1 {
            errors.push(SchemaError::InvalidPickRename);
            continue;
        }

        for key in keys {
            let Some(source_node) = source.node(&key) else {
                errors.push(SchemaError::MissingPickedItem {
                    service: source_name.to_string(),
                    key,
                });
                continue;
            };
            let new_key = match &pick.rename {
                Some(PickRename::To(name)) => name.clone(),
                Some(PickRename::With(rename)) => rename(&key),
                None => key.clone(),
            };
            let resolver = Resolver::pick_with(source_name, &key, pick.transform.clone());
            nodes.push(ConfigNode::new(
                service.name(),
                new_key,
                std::sync::Arc::clone(source_node.data_type()),
                resolver,
            ));
        }
    }
    (nodes, errors)
}
