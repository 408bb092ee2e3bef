//! Serialized workspace shapes consumed by CLI and UI collaborators
//!
//! All shapes serialize to camelCase JSON. Optional error lists are left
//! out entirely when empty.

use cfgraph_types::{CoercionError, DataType, UsePhase, ValidationError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigLoadError, ResolutionError, SchemaError};
use crate::logging::redact;
use crate::node::ConfigNode;
use crate::overrides::AppliedOverride;
use crate::plugin::{InputState, PluginInstance, PluginRegistry};
use crate::service::Service;

/// Uniform error shape: `{type, message, tip?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

impl SerializedError {
    fn new(kind: &str, message: impl ToString, tip: Option<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.to_string(),
            tip,
        }
    }
}

impl From<&SchemaError> for SerializedError {
    fn from(err: &SchemaError) -> Self {
        Self::new("SchemaError", err, None)
    }
}

impl From<&ValidationError> for SerializedError {
    fn from(err: &ValidationError) -> Self {
        let kind = if err.is_empty_required() {
            "EmptyRequiredValueError"
        } else {
            "ValidationError"
        };
        Self::new(kind, &err.message, err.tip.clone())
    }
}

impl From<&CoercionError> for SerializedError {
    fn from(err: &CoercionError) -> Self {
        Self::new("CoercionError", &err.message, err.tip.clone())
    }
}

impl From<&ResolutionError> for SerializedError {
    fn from(err: &ResolutionError) -> Self {
        Self::new("ResolutionError", err, None)
    }
}

impl From<&ConfigLoadError> for SerializedError {
    fn from(err: &ConfigLoadError) -> Self {
        let tip = err.path.as_ref().map(|path| format!("Check {path}"));
        Self::new("ConfigLoadError", err, tip)
    }
}

fn error_list<'a, T: 'a>(errors: impl IntoIterator<Item = &'a T>) -> Option<Vec<SerializedError>>
where
    SerializedError: From<&'a T>,
{
    let list: Vec<SerializedError> = errors.into_iter().map(SerializedError::from).collect();
    (!list.is_empty()).then_some(list)
}

/// Effective metadata of a node's type chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedDataType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sensitive: bool,
    pub required: bool,
    pub use_at: Vec<UsePhase>,
    pub dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_env_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_env_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

impl From<&DataType> for SerializedDataType {
    fn from(data_type: &DataType) -> Self {
        Self {
            type_label: data_type.type_label().map(str::to_string),
            summary: data_type.summary(),
            description: data_type.description(),
            sensitive: data_type.is_sensitive(),
            required: data_type.is_required(),
            use_at: data_type.use_at(),
            dynamic: data_type.is_dynamic(),
            import_env_key: data_type.import_env_key(),
            export_env_key: data_type.export_env_key(),
            examples: data_type.examples(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedConfigNode {
    pub key: String,
    pub is_valid: bool,
    pub is_schema_valid: bool,
    pub resolved_raw_value: Option<Value>,
    pub resolved_value: Option<Value>,
    pub is_resolved: bool,
    pub is_dynamic: bool,
    pub is_using_cache: bool,
    pub data_type: SerializedDataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_errors: Option<Vec<SerializedError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coercion_error: Option<SerializedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<SerializedError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<SerializedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<AppliedOverride>>,
}

fn mask(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(redact(s)),
        other => Value::String(redact(&other.to_string())),
    }
}

impl SerializedConfigNode {
    pub fn from_node(node: &ConfigNode, redact_sensitive: bool) -> Self {
        let masked = redact_sensitive && node.is_sensitive();
        let show = |value: Option<&Value>| value.map(|v| if masked { mask(v) } else { v.clone() });
        let overrides: Vec<AppliedOverride> = node
            .overrides()
            .iter()
            .map(|applied| AppliedOverride {
                value: if masked { mask(&applied.value) } else { applied.value.clone() },
                ..applied.clone()
            })
            .collect();

        Self {
            key: node.key().to_string(),
            is_valid: node.is_valid(),
            is_schema_valid: node.is_schema_valid(),
            resolved_raw_value: show(node.resolved_raw_value()),
            resolved_value: show(node.resolved_value()),
            is_resolved: node.is_resolved(),
            is_dynamic: node.is_dynamic(),
            is_using_cache: node.resolver().is_using_cache(),
            data_type: SerializedDataType::from(node.data_type().as_ref()),
            schema_errors: error_list(node.schema_errors()),
            coercion_error: node.coercion_error().map(SerializedError::from),
            validation_errors: error_list(node.validation_errors()),
            resolution_error: node.resolution_error().map(SerializedError::from),
            overrides: (!overrides.is_empty()).then_some(overrides),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedService {
    pub package_name: String,
    pub service_name: String,
    pub path: String,
    pub is_schema_valid: bool,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_load_error: Option<SerializedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_errors: Option<Vec<SerializedError>>,
    pub config: IndexMap<String, SerializedConfigNode>,
}

impl SerializedService {
    pub fn from_service(service: &Service, redact_sensitive: bool) -> Self {
        Self {
            package_name: service.package_name().to_string(),
            service_name: service.name().to_string(),
            path: service.path().to_string(),
            is_schema_valid: service.is_schema_valid(),
            is_valid: service.is_valid(),
            parent: service.parent().map(str::to_string),
            config_load_error: service.config_load_error().map(SerializedError::from),
            schema_errors: error_list(service.schema_errors()),
            config: service
                .nodes()
                .iter()
                .map(|(key, node)| {
                    (key.clone(), SerializedConfigNode::from_node(node, redact_sensitive))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedPluginInput {
    pub resolved_value: Option<Value>,
    pub is_resolved: bool,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coercion_error: Option<SerializedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<SerializedError>>,
}

impl SerializedPluginInput {
    fn from_state(state: &InputState, redact_values: bool) -> Self {
        Self {
            resolved_value: state
                .resolved_value
                .as_ref()
                .map(|v| if redact_values { mask(v) } else { v.clone() }),
            is_resolved: state.is_resolved,
            is_valid: state.is_valid(),
            bound_from: state.bound_from.clone(),
            coercion_error: state.coercion_error.as_ref().map(SerializedError::from),
            validation_errors: error_list(&state.validation_errors),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedPlugin {
    pub plugin_type: String,
    pub instance_name: String,
    pub owner_service: String,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_errors: Option<Vec<SerializedError>>,
    pub inputs: IndexMap<String, SerializedPluginInput>,
}

impl SerializedPlugin {
    /// Plugin inputs are usually credentials, so redaction masks all of them.
    pub fn from_instance(instance: &PluginInstance, redact_sensitive: bool) -> Self {
        Self {
            plugin_type: instance.plugin_type().to_string(),
            instance_name: instance.instance_id().to_string(),
            owner_service: instance.owner().to_string(),
            is_valid: instance.is_valid(),
            schema_errors: error_list(instance.schema_errors()),
            inputs: instance
                .inputs()
                .iter()
                .map(|(key, state)| {
                    (key.clone(), SerializedPluginInput::from_state(state, redact_sensitive))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedWorkspace {
    pub services: IndexMap<String, SerializedService>,
    pub plugins: IndexMap<String, SerializedPlugin>,
}

impl SerializedWorkspace {
    pub fn build<'a>(
        services: impl IntoIterator<Item = &'a Service>,
        plugins: &PluginRegistry,
        redact_sensitive: bool,
    ) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|s| (s.name().to_string(), SerializedService::from_service(s, redact_sensitive)))
                .collect(),
            plugins: plugins
                .iter()
                .map(|p| {
                    (
                        p.instance_id().to_string(),
                        SerializedPlugin::from_instance(p, redact_sensitive),
                    )
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}
