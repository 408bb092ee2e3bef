//! Service schema declarations handed over by the host
//!
//! Loading a schema from a source file is the host's job; the engine
//! starts from an in-memory [`ServiceDefinition`].

use std::fmt;
use std::sync::Arc;

use cfgraph_types::{
    CoerceFn, CoercionError, DataType, TypeError, TypeMetadata, TypeRef, TypeRegistry, UsePhase,
    ValidateFn, ValidationError, infer_type,
};
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::ConfigLoadError;
use crate::plugin::PluginDeclaration;
use crate::resolver::{Resolver, TransformFn};

/// Declaration of one configuration item.
#[derive(Clone, Default)]
pub struct ConfigItemSchema {
    /// Parent type; inferred from a static value when absent
    pub extends: Option<TypeRef>,
    pub value: Option<Resolver>,
    pub metadata: TypeMetadata,
    pub validate: Option<ValidateFn>,
    pub coerce: Option<CoerceFn>,
}

impl ConfigItemSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extends(mut self, type_ref: impl Into<TypeRef>) -> Self {
        self.extends = Some(type_ref.into());
        self
    }

    pub fn value(mut self, resolver: impl Into<Resolver>) -> Self {
        self.value = Some(resolver.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.metadata.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.metadata.required = Some(required);
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.metadata.sensitive = Some(sensitive);
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.metadata.dynamic = Some(dynamic);
        self
    }

    pub fn use_at(mut self, phases: Vec<UsePhase>) -> Self {
        self.metadata.use_at = Some(phases);
        self
    }

    pub fn import_env_key(mut self, key: impl Into<String>) -> Self {
        self.metadata.import_env_key = Some(key.into());
        self
    }

    pub fn export_env_key(mut self, key: impl Into<String>) -> Self {
        self.metadata.export_env_key = Some(key.into());
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<(), Vec<ValidationError>> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    pub fn coerce<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Value) -> Result<Value, CoercionError> + Send + Sync + 'static,
    {
        self.coerce = Some(Arc::new(f));
        self
    }

    /// Build the item's own anonymous link on top of its resolved parent.
    pub fn build_type(&self, types: &TypeRegistry) -> Result<Arc<DataType>, TypeError> {
        let type_ref = match &self.extends {
            Some(type_ref) => type_ref.clone(),
            None => infer_type(self.value.as_ref().and_then(Resolver::static_literal)),
        };
        let parent = types.resolve(&type_ref)?;
        let mut builder = DataType::anonymous()
            .extends(parent)
            .metadata(self.metadata.clone());
        if let Some(validate) = &self.validate {
            builder = builder.validate_fn(Arc::clone(validate));
        }
        if let Some(coerce) = &self.coerce {
            builder = builder.coerce_fn(Arc::clone(coerce));
        }
        Ok(builder.build_arc())
    }
}

impl fmt::Debug for ConfigItemSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigItemSchema")
            .field("extends", &self.extends.as_ref().map(TypeRef::display_name))
            .field("value", &self.value)
            .field("metadata", &self.metadata)
            .finish()
    }
}

type KeyFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type RenameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Which keys a pick takes from its source.
#[derive(Clone)]
pub enum PickKeys {
    One(String),
    Many(Vec<String>),
    Filter(KeyFilter),
}

impl PickKeys {
    pub fn filter<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Filter(Arc::new(f))
    }

    /// Select keys from the source's declared item keys, in source order.
    /// Explicitly named keys are returned as given, even if absent.
    pub fn select<'a>(&self, available: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        match self {
            Self::One(key) => vec![key.clone()],
            Self::Many(keys) => keys.clone(),
            Self::Filter(f) => available
                .into_iter()
                .filter(|key| f(key))
                .map(str::to_string)
                .collect(),
        }
    }
}

impl From<&str> for PickKeys {
    fn from(key: &str) -> Self {
        Self::One(key.to_string())
    }
}

impl From<Vec<&str>> for PickKeys {
    fn from(keys: Vec<&str>) -> Self {
        Self::Many(keys.into_iter().map(str::to_string).collect())
    }
}

/// How picked keys are named in the picking service.
#[derive(Clone)]
pub enum PickRename {
    /// Fixed name; only valid when exactly one key is picked
    To(String),
    With(RenameFn),
}

/// A reference letting one service reuse another service's values.
#[derive(Clone)]
pub struct PickSpec {
    /// Source service; `None` means the root service
    pub source: Option<String>,
    pub keys: PickKeys,
    pub rename: Option<PickRename>,
    pub transform: Option<TransformFn>,
}

impl PickSpec {
    /// Pick from the root service.
    pub fn new(keys: impl Into<PickKeys>) -> Self {
        Self {
            source: None,
            keys: keys.into(),
            rename: None,
            transform: None,
        }
    }

    pub fn from_service(mut self, service: impl Into<String>) -> Self {
        self.source = Some(service.into());
        self
    }

    pub fn rename_to(mut self, key: impl Into<String>) -> Self {
        self.rename = Some(PickRename::To(key.into()));
        self
    }

    pub fn rename_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.rename = Some(PickRename::With(Arc::new(f)));
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for PickSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = match &self.keys {
            PickKeys::One(key) => format!("{key:?}"),
            PickKeys::Many(keys) => format!("{keys:?}"),
            PickKeys::Filter(_) => "<filter>".to_string(),
        };
        let rename = match &self.rename {
            Some(PickRename::To(key)) => Some(key.clone()),
            Some(PickRename::With(_)) => Some("<fn>".to_string()),
            None => None,
        };
        f.debug_struct("PickSpec")
            .field("source", &self.source)
            .field("keys", &keys)
            .field("rename", &rename)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

/// The config schema of one service.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigSchema {
    /// Explicit parent; non-root services default to the root
    pub parent: Option<String>,
    pub pick: Vec<PickSpec>,
    pub schema: IndexMap<String, ConfigItemSchema>,
    /// Plugin instances this service creates
    pub plugins: Vec<PluginDeclaration>,
    /// Plugin instances owned by other services that this one uses
    pub inject_plugins: Vec<String>,
}

impl ServiceConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn pick(mut self, pick: PickSpec) -> Self {
        self.pick.push(pick);
        self
    }

    pub fn item(mut self, key: impl Into<String>, item: ConfigItemSchema) -> Self {
        self.schema.insert(key.into(), item);
        self
    }

    pub fn plugin(mut self, plugin: PluginDeclaration) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn inject_plugin(mut self, instance_id: impl Into<String>) -> Self {
        self.inject_plugins.push(instance_id.into());
        self
    }
}

/// A discovered service, as handed over by the host.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub service_name: String,
    pub package_name: String,
    pub path: String,
    pub is_root: bool,
    pub schema: Result<ServiceConfigSchema, ConfigLoadError>,
}

impl ServiceDefinition {
    pub fn new(service_name: impl Into<String>, schema: ServiceConfigSchema) -> Self {
        let service_name = service_name.into();
        Self {
            package_name: service_name.clone(),
            path: String::new(),
            service_name,
            is_root: false,
            schema: Ok(schema),
        }
    }

    pub fn root(service_name: impl Into<String>, schema: ServiceConfigSchema) -> Self {
        let mut definition = Self::new(service_name, schema);
        definition.is_root = true;
        definition
    }

    /// A service whose schema could not be loaded.
    pub fn failed(service_name: impl Into<String>, error: ConfigLoadError) -> Self {
        let mut definition = Self::new(service_name, ServiceConfigSchema::default());
        definition.schema = Err(error);
        definition
    }

    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }
}
