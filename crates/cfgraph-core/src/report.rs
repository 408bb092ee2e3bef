//! Failure stanzas for CLI-type consumers
//!
//! One stanza per failing service or item, so a consumer can print every
//! problem instead of stopping at the first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plugin::PluginInstance;
use crate::service::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    ConfigLoad,
    Schema,
    Resolution,
    Coercion,
    Validation,
    Plugin,
}

/// A group of related problems on one service, item or plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureStanza {
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub kind: FailureKind,
    pub messages: Vec<String>,
}

impl FailureStanza {
    fn new(service: &str, item: Option<&str>, kind: FailureKind, messages: Vec<String>) -> Self {
        Self {
            service: service.to_string(),
            item: item.map(str::to_string),
            kind,
            messages,
        }
    }
}

impl fmt::Display for FailureStanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => writeln!(f, "{}.{} ({:?})", self.service, item, self.kind)?,
            None => writeln!(f, "{} ({:?})", self.service, self.kind)?,
        }
        for message in &self.messages {
            writeln!(f, "  - {message}")?;
        }
        Ok(())
    }
}

/// Stanzas for one service and its nodes.
pub fn service_failures(service: &Service) -> Vec<FailureStanza> {
    let name = service.name();
    let mut stanzas = Vec::new();

    if let Some(err) = service.config_load_error() {
        stanzas.push(FailureStanza::new(
            name,
            None,
            FailureKind::ConfigLoad,
            vec![err.to_string()],
        ));
    }
    if !service.schema_errors().is_empty() {
        stanzas.push(FailureStanza::new(
            name,
            None,
            FailureKind::Schema,
            service.schema_errors().iter().map(ToString::to_string).collect(),
        ));
    }

    for node in service.nodes().values() {
        let key = Some(node.key());
        if !node.schema_errors().is_empty() {
            let messages = node.schema_errors().iter().map(ToString::to_string).collect();
            stanzas.push(FailureStanza::new(name, key, FailureKind::Schema, messages));
        }
        if let Some(err) = node.resolution_error() {
            stanzas.push(FailureStanza::new(
                name,
                key,
                FailureKind::Resolution,
                vec![err.to_string()],
            ));
        }
        if let Some(err) = node.coercion_error() {
            stanzas.push(FailureStanza::new(
                name,
                key,
                FailureKind::Coercion,
                vec![err.to_string()],
            ));
        }
        if !node.validation_errors().is_empty() {
            let messages = node
                .validation_errors()
                .iter()
                .map(ToString::to_string)
                .collect();
            stanzas.push(FailureStanza::new(name, key, FailureKind::Validation, messages));
        }
    }
    stanzas
}

/// A stanza for an unusable plugin, if it is one.
pub fn plugin_failure(plugin: &PluginInstance) -> Option<FailureStanza> {
    if plugin.is_valid() {
        return None;
    }
    let mut messages: Vec<String> = plugin
        .schema_errors()
        .iter()
        .map(ToString::to_string)
        .collect();
    for (input, state) in plugin.inputs() {
        if let Some(err) = &state.coercion_error {
            messages.push(format!("input '{input}': {err}"));
        }
        for err in &state.validation_errors {
            messages.push(format!("input '{input}': {err}"));
        }
    }
    for input in plugin.missing_inputs() {
        messages.push(format!("input '{input}' has not been resolved"));
    }
    Some(FailureStanza::new(
        plugin.owner(),
        Some(plugin.instance_id()),
        FailureKind::Plugin,
        messages,
    ))
}
