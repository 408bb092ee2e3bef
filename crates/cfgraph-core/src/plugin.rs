//! Plugins and plugin input binding
//!
//! A plugin declares typed inputs. Each input is bound by exactly one
//! strategy, decided when the plugin instance is created:
//!
//! - a static value, resolved immediately
//! - a path reference (`service.key`), bound when that item resolves
//! - type injection, bound to the first resolved item whose type chain
//!   extends the input's declared type
//!
//! Once every required input is resolved, the plugin can serve values to
//! resolvers through a [`PluginHandle`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use cfgraph_types::{CoercionError, DataType, TypeRef, TypeRegistry, ValidationError};
use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{ResolutionError, SchemaError};
use crate::resolver::{BoxError, panic_message};

/// Declared contract of one plugin input.
#[derive(Debug, Clone, Default)]
pub struct PluginInputSchema {
    pub required: bool,
    /// Type the bound value must extend
    pub extends: Option<TypeRef>,
    pub description: Option<String>,
}

impl PluginInputSchema {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    pub fn optional() -> Self {
        Self::default()
    }

    pub fn extends(mut self, type_ref: impl Into<TypeRef>) -> Self {
        self.extends = Some(type_ref.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An external integration that can supply configuration values.
#[async_trait]
pub trait PluginProvider: Send + Sync {
    fn plugin_type(&self) -> &str;

    fn input_schema(&self) -> IndexMap<String, PluginInputSchema>;

    /// Produce the value identified by `reference`, given fully bound inputs.
    async fn resolve_item(
        &self,
        inputs: &BTreeMap<String, Value>,
        reference: &Value,
    ) -> std::result::Result<Value, BoxError>;
}

/// Explicit input value given by the declaring service.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Static(Value),
    /// Full item path, `service.key`
    Path(String),
}

/// A plugin instance created by a service.
#[derive(Clone)]
pub struct PluginDeclaration {
    pub instance_id: String,
    pub provider: Arc<dyn PluginProvider>,
    pub inputs: BTreeMap<String, InputSource>,
}

impl PluginDeclaration {
    pub fn new(instance_id: impl Into<String>, provider: Arc<dyn PluginProvider>) -> Self {
        Self {
            instance_id: instance_id.into(),
            provider,
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_static(mut self, input: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs
            .insert(input.into(), InputSource::Static(value.into()));
        self
    }

    pub fn with_path(mut self, input: impl Into<String>, path: impl Into<String>) -> Self {
        self.inputs.insert(input.into(), InputSource::Path(path.into()));
        self
    }
}

impl fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDeclaration")
            .field("instance_id", &self.instance_id)
            .field("plugin_type", &self.provider.plugin_type())
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// How an input gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputBinding {
    Static,
    Path(String),
    TypeInjection,
    /// Optional input with no source and no type to inject by
    Unbound,
}

/// Binding state of one input.
#[derive(Debug, Clone)]
pub struct InputState {
    pub binding: InputBinding,
    pub required: bool,
    pub resolved_value: Option<Value>,
    pub is_resolved: bool,
    /// Path of the item whose value was bound
    pub bound_from: Option<String>,
    pub coercion_error: Option<CoercionError>,
    pub validation_errors: Vec<ValidationError>,
}

impl InputState {
    fn new(binding: InputBinding, required: bool) -> Self {
        Self {
            binding,
            required,
            resolved_value: None,
            is_resolved: false,
            bound_from: None,
            coercion_error: None,
            validation_errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        if !self.is_resolved {
            return !self.required;
        }
        self.coercion_error.is_none() && self.validation_errors.is_empty()
    }
}

/// A registered plugin instance and the state of its inputs.
pub struct PluginInstance {
    instance_id: String,
    owner: String,
    provider: Arc<dyn PluginProvider>,
    input_types: BTreeMap<String, Arc<DataType>>,
    inputs: IndexMap<String, InputState>,
    schema_errors: Vec<SchemaError>,
}

impl PluginInstance {
    /// Create an instance from a declaration, binding static inputs now.
    ///
    /// Problems with the declaration (unknown inputs, unresolvable types)
    /// are recorded on the instance.
    pub fn new(declaration: &PluginDeclaration, owner: &str, types: &TypeRegistry) -> Self {
        let schema = declaration.provider.input_schema();
        let mut instance = Self {
            instance_id: declaration.instance_id.clone(),
            owner: owner.to_string(),
            provider: Arc::clone(&declaration.provider),
            input_types: BTreeMap::new(),
            inputs: IndexMap::new(),
            schema_errors: Vec::new(),
        };

        for input in declaration.inputs.keys() {
            if !schema.contains_key(input) {
                instance.schema_errors.push(SchemaError::InvalidPluginInput {
                    instance_id: instance.instance_id.clone(),
                    input: input.clone(),
                    reason: "input is not declared by the plugin".to_string(),
                });
            }
        }

        for (name, input_schema) in &schema {
            if let Some(type_ref) = &input_schema.extends {
                match types.resolve(type_ref) {
                    Ok(t) => {
                        instance.input_types.insert(name.clone(), t);
                    }
                    Err(err) => instance.schema_errors.push(SchemaError::InvalidPluginInput {
                        instance_id: instance.instance_id.clone(),
                        input: name.clone(),
                        reason: err.to_string(),
                    }),
                }
            }

            let binding = match declaration.inputs.get(name) {
                Some(InputSource::Static(_)) => InputBinding::Static,
                Some(InputSource::Path(path)) => InputBinding::Path(path.clone()),
                None if input_schema.extends.is_some() => InputBinding::TypeInjection,
                None => InputBinding::Unbound,
            };
            if binding == InputBinding::Unbound && input_schema.required {
                instance.schema_errors.push(SchemaError::InvalidPluginInput {
                    instance_id: instance.instance_id.clone(),
                    input: name.clone(),
                    reason: "required input has no value, path or type to inject".to_string(),
                });
            }
            instance
                .inputs
                .insert(name.clone(), InputState::new(binding, input_schema.required));

            if let Some(InputSource::Static(value)) = declaration.inputs.get(name) {
                instance.bind(name, value.clone(), None);
            }
        }
        instance
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Service that declared this instance.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn plugin_type(&self) -> &str {
        self.provider.plugin_type()
    }

    pub fn inputs(&self) -> &IndexMap<String, InputState> {
        &self.inputs
    }

    pub fn schema_errors(&self) -> &[SchemaError] {
        &self.schema_errors
    }

    /// Paths referenced by path-bound inputs.
    pub fn path_references(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().filter_map(|s| match &s.binding {
            InputBinding::Path(path) => Some(path.as_str()),
            _ => None,
        })
    }

    /// Required inputs that are not yet resolved and valid.
    pub fn missing_inputs(&self) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|(_, state)| state.required && !(state.is_resolved && state.is_valid()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.schema_errors.is_empty() && self.missing_inputs().is_empty()
    }

    /// Offer a freshly resolved item to every pending input.
    ///
    /// Returns the inputs that were bound.
    pub fn offer(&mut self, path: &str, data_type: &DataType, value: &Value) -> Vec<String> {
        let mut bound = Vec::new();
        let pending: Vec<String> = self
            .inputs
            .iter()
            .filter(|(_, state)| !state.is_resolved)
            .filter(|(name, state)| match &state.binding {
                InputBinding::Path(reference) => reference == path,
                InputBinding::TypeInjection => self
                    .input_types
                    .get(*name)
                    .is_some_and(|expected| data_type.extends(expected)),
                InputBinding::Static | InputBinding::Unbound => false,
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in pending {
            tracing::debug!(
                plugin = %self.instance_id,
                input = %name,
                from = %path,
                "Bound plugin input"
            );
            self.bind(&name, value.clone(), Some(path.to_string()));
            bound.push(name);
        }
        bound
    }

    fn bind(&mut self, name: &str, value: Value, from: Option<String>) {
        let input_type = self.input_types.get(name).cloned();
        let Some(state) = self.inputs.get_mut(name) else {
            return;
        };
        state.is_resolved = true;
        state.bound_from = from;
        let Some(input_type) = input_type else {
            state.resolved_value = Some(value);
            return;
        };
        match input_type.coerce(value) {
            Ok(coerced) => {
                if let Err(errors) = input_type.validate(&coerced) {
                    state.validation_errors = errors;
                }
                state.resolved_value = Some(coerced);
            }
            Err(err) => state.coercion_error = Some(err),
        }
    }

    /// Snapshot handed to resolver contexts.
    pub fn handle(&self) -> PluginHandle {
        let inputs = self
            .inputs
            .iter()
            .filter(|(_, state)| state.is_resolved && state.is_valid())
            .filter_map(|(name, state)| Some((name.clone(), state.resolved_value.clone()?)))
            .collect();
        let mut missing = self.missing_inputs();
        if !self.schema_errors.is_empty() && missing.is_empty() {
            missing.push("<invalid declaration>".to_string());
        }
        PluginHandle {
            instance_id: self.instance_id.clone(),
            provider: Arc::clone(&self.provider),
            inputs: Arc::new(inputs),
            missing,
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("instance_id", &self.instance_id)
            .field("owner", &self.owner)
            .field("plugin_type", &self.plugin_type())
            .field("inputs", &self.inputs)
            .field("schema_errors", &self.schema_errors)
            .finish()
    }
}

/// Read-only view of a plugin, shared with resolvers.
#[derive(Clone)]
pub struct PluginHandle {
    instance_id: String,
    provider: Arc<dyn PluginProvider>,
    inputs: Arc<BTreeMap<String, Value>>,
    missing: Vec<String>,
}

impl PluginHandle {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn is_ready(&self) -> bool {
        self.missing.is_empty()
    }

    pub async fn resolve_item(&self, reference: &Value) -> Result<Value, ResolutionError> {
        if !self.missing.is_empty() {
            return Err(ResolutionError::PluginNotReady {
                instance_id: self.instance_id.clone(),
                missing: self.missing.clone(),
            });
        }
        let lookup = AssertUnwindSafe(self.provider.resolve_item(&self.inputs, reference));
        match lookup.catch_unwind().await {
            Ok(result) => result.map_err(|err| ResolutionError::PluginFailed {
                instance_id: self.instance_id.clone(),
                message: err.to_string(),
            }),
            Err(payload) => Err(ResolutionError::PluginFailed {
                instance_id: self.instance_id.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("instance_id", &self.instance_id)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("missing", &self.missing)
            .finish()
    }
}

/// Plugin instances owned by one workspace build.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    instances: IndexMap<String, PluginInstance>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance. Re-registering from the same owner is a no-op,
    /// so a re-queued service can initialize again safely.
    ///
    /// Returns whether the instance was newly added.
    pub fn register(&mut self, instance: PluginInstance) -> Result<bool, SchemaError> {
        match self.instances.get(instance.instance_id()) {
            Some(existing) if existing.owner() == instance.owner() => Ok(false),
            Some(_) => Err(SchemaError::DuplicatePlugin {
                instance_id: instance.instance_id().to_string(),
            }),
            None => {
                tracing::debug!(
                    plugin = %instance.instance_id(),
                    owner = %instance.owner(),
                    "Registered plugin instance"
                );
                self.instances
                    .insert(instance.instance_id().to_string(), instance);
                Ok(true)
            }
        }
    }

    pub fn get(&self, instance_id: &str) -> Option<&PluginInstance> {
        self.instances.get(instance_id)
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginInstance> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Offer a resolved item to every plugin. Returns whether any input bound.
    pub fn offer(&mut self, path: &str, data_type: &DataType, value: &Value) -> bool {
        let mut any = false;
        for instance in self.instances.values_mut() {
            any |= !instance.offer(path, data_type, value).is_empty();
        }
        any
    }

    /// Handles for the given instance ids, skipping unknown ones.
    pub fn handles<'a>(
        &self,
        instance_ids: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, PluginHandle> {
        instance_ids
            .into_iter()
            .filter_map(|id| self.instances.get(id))
            .map(|instance| (instance.instance_id().to_string(), instance.handle()))
            .collect()
    }
}
