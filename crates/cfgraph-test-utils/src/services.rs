//! Shorthand for service definitions.

use cfgraph_core::{ConfigItemSchema, Resolver, ServiceConfigSchema, ServiceDefinition};
use serde_json::Value;

/// An item with a static value and an inferred type.
pub fn item(value: impl Into<Value>) -> ConfigItemSchema {
    ConfigItemSchema::new().value(Resolver::static_value(value))
}

/// A root service with the given items.
pub fn root<'a>(name: &str, items: impl IntoIterator<Item = (&'a str, ConfigItemSchema)>) -> ServiceDefinition {
    ServiceDefinition::root(name, with_items(ServiceConfigSchema::new(), items))
}

/// A child service with the given schema and items.
pub fn service<'a>(
    name: &str,
    schema: ServiceConfigSchema,
    items: impl IntoIterator<Item = (&'a str, ConfigItemSchema)>,
) -> ServiceDefinition {
    ServiceDefinition::new(name, with_items(schema, items))
}

fn with_items<'a>(
    schema: ServiceConfigSchema,
    items: impl IntoIterator<Item = (&'a str, ConfigItemSchema)>,
) -> ServiceConfigSchema {
    items
        .into_iter()
        .fold(schema, |schema, (key, item)| schema.item(key, item))
}
