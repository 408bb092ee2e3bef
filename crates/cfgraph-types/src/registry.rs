//! Type registry
//!
//! Maps type names to the factories that build them, and resolves a
//! [`TypeRef`] into a single concrete parent.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtins;
use crate::data_type::DataType;
use crate::error::{Result, TypeError};
use crate::type_ref::{TypeFactory, TypeRef};

/// Registry of named type factories.
///
/// # Example
///
/// ```
/// use cfgraph_types::{TypeRef, TypeRegistry};
/// use serde_json::json;
///
/// let registry = TypeRegistry::with_builtins();
/// let port = registry.resolve(&TypeRef::alias("port")).unwrap();
/// assert!(port.validate(&json!(8080)).is_ok());
/// assert!(port.validate(&json!(70000)).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    factories: HashMap<String, TypeFactory>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in types registered:
    /// `primitive`, `string`, `number`, `boolean`, `url`, `email`, `port`, `enum`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(TypeFactory::new(crate::data_type::PRIMITIVE_LABEL, |_| {
            Ok((*DataType::primitive()).clone())
        }));
        registry.register(builtins::string::factory());
        registry.register(builtins::number::factory());
        registry.register(builtins::boolean::factory());
        registry.register(builtins::network::url_factory());
        registry.register(builtins::network::email_factory());
        registry.register(builtins::network::port_factory());
        registry.register(builtins::enumeration::factory());
        registry
    }

    /// Register a factory under its name. Re-registering replaces it.
    pub fn register(&mut self, factory: TypeFactory) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<&TypeFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn list_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Resolve a reference into a concrete type instance.
    ///
    /// # Errors
    ///
    /// `TypeError::UnknownType` for an unregistered alias, or whatever the
    /// factory reports for bad settings.
    pub fn resolve(&self, type_ref: &TypeRef) -> Result<Arc<DataType>> {
        match type_ref {
            TypeRef::Direct(t) => Ok(Arc::clone(t)),
            TypeRef::Factory { factory, settings } => factory.instantiate(settings),
            TypeRef::Alias { name, settings } => {
                let factory = self.get(name).ok_or_else(|| TypeError::UnknownType {
                    name: name.clone(),
                })?;
                tracing::trace!(type_name = %name, "Resolving type alias");
                factory.instantiate(settings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_builtins() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(
            registry.list_types(),
            vec!["boolean", "email", "enum", "number", "port", "primitive", "string", "url"]
        );
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = TypeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_unknown_alias() {
        let registry = TypeRegistry::with_builtins();
        let err = registry.resolve(&TypeRef::alias("strng")).unwrap_err();
        assert_eq!(
            err,
            TypeError::UnknownType {
                name: "strng".to_string()
            }
        );
    }

    #[test]
    fn test_all_variants_resolve_to_concrete_parent() {
        let registry = TypeRegistry::with_builtins();
        let direct = registry
            .resolve(&TypeRef::from(DataType::builder("custom").build()))
            .unwrap();
        assert_eq!(direct.label(), Some("custom"));

        let factory = registry.get("string").unwrap().clone();
        let from_factory = registry.resolve(&TypeRef::factory(factory)).unwrap();
        assert_eq!(from_factory.label(), Some("string"));

        let alias = registry
            .resolve(&TypeRef::alias_with("string", json!({"minLength": 3})))
            .unwrap();
        assert!(alias.validate(&json!("ab")).is_err());
    }

    #[test]
    fn test_register_custom_factory() {
        let mut registry = TypeRegistry::with_builtins();
        let string = registry.get("string").unwrap().clone();
        registry.register(TypeFactory::new("slug", move |settings| {
            Ok(DataType::builder("slug")
                .extends(string.instantiate(settings)?)
                .validate(|v, _| match v.as_str() {
                    Some(s) if s.chars().all(|c| c.is_ascii_lowercase() || c == '-') => Ok(()),
                    _ => Err(vec![crate::ValidationError::new("not a slug")]),
                })
                .build())
        }));

        let slug = registry.resolve(&TypeRef::alias("slug")).unwrap();
        assert!(slug.validate(&json!("my-slug")).is_ok());
        assert!(slug.validate(&json!("My Slug")).is_err());
        assert!(slug.extends(&registry.resolve(&"string".into()).unwrap()));
    }
}
