//! Environment variables injected into launched processes

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logging::redact;
use crate::service::Service;

/// One variable for a process environment.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedEnvVar {
    pub value: Option<String>,
    pub sensitive: bool,
    pub dynamic: bool,
}

impl fmt::Display for InjectedEnvVar {
    /// Sensitive values are masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.sensitive) {
            (None, _) => Ok(()),
            (Some(value), true) => f.write_str(&redact(value)),
            (Some(value), false) => f.write_str(value),
        }
    }
}

impl fmt::Debug for InjectedEnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match (&self.value, self.sensitive) {
            (Some(value), true) => Some(redact(value)),
            (value, _) => value.clone(),
        };
        f.debug_struct("InjectedEnvVar")
            .field("value", &value)
            .field("sensitive", &self.sensitive)
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

/// Render a value the way it is written into an environment: strings raw,
/// everything else as JSON. Empty values have no representation.
pub fn env_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Variables for every node of a service, keyed by export key (falling
/// back to the node key). Unresolved nodes have no value.
pub fn env_for_service(service: &Service) -> BTreeMap<String, InjectedEnvVar> {
    service
        .nodes()
        .values()
        .map(|node| {
            let data_type = node.data_type();
            let name = data_type
                .export_env_key()
                .unwrap_or_else(|| node.key().to_string());
            let value = node
                .is_resolved()
                .then(|| node.resolved_value().and_then(env_string))
                .flatten();
            (
                name,
                InjectedEnvVar {
                    value,
                    sensitive: data_type.is_sensitive(),
                    dynamic: data_type.is_dynamic(),
                },
            )
        })
        .collect()
}
