//! [`TablePlugin`] for plugin scenarios.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cfgraph_core::{BoxError, PluginInputSchema, PluginProvider};
use indexmap::IndexMap;
use serde_json::{Value, json};

/// A plugin whose items come from a fixed table.
///
/// A reference that is a string is looked up in the table. The answer is
/// the table entry with every bound input appended as `name=value`, so tests
/// can see which inputs the plugin received.
#[derive(Debug, Clone, Default)]
pub struct TablePlugin {
    plugin_type: String,
    schema: IndexMap<String, PluginInputSchema>,
    table: BTreeMap<String, String>,
}

impl TablePlugin {
    pub fn new(plugin_type: impl Into<String>) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            ..Self::default()
        }
    }

    pub fn input(mut self, name: impl Into<String>, schema: PluginInputSchema) -> Self {
        self.schema.insert(name.into(), schema);
        self
    }

    pub fn entry(mut self, reference: impl Into<String>, value: impl Into<String>) -> Self {
        self.table.insert(reference.into(), value.into());
        self
    }
}

#[async_trait]
impl PluginProvider for TablePlugin {
    fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    fn input_schema(&self) -> IndexMap<String, PluginInputSchema> {
        self.schema.clone()
    }

    async fn resolve_item(
        &self,
        inputs: &BTreeMap<String, Value>,
        reference: &Value,
    ) -> Result<Value, BoxError> {
        let key = reference
            .as_str()
            .ok_or_else(|| format!("reference must be a string, got {reference}"))?;
        let entry = self
            .table
            .get(key)
            .ok_or_else(|| format!("no entry named '{key}'"))?;

        let mut parts = vec![entry.clone()];
        for (name, value) in inputs {
            let rendered = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            parts.push(format!("{name}={rendered}"));
        }
        Ok(json!(parts.join(";")))
    }
}
