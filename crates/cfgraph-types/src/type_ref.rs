//! References to a parent type, resolved once into a concrete chain link

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::data_type::DataType;
use crate::error::Result;

type BuildFn = Arc<dyn Fn(&Value) -> Result<DataType> + Send + Sync>;

/// A named constructor producing type instances from settings.
#[derive(Clone)]
pub struct TypeFactory {
    name: String,
    build: BuildFn,
}

impl TypeFactory {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Value) -> Result<DataType> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build an instance. `Value::Null` means "no settings".
    pub fn instantiate(&self, settings: &Value) -> Result<Arc<DataType>> {
        (self.build)(settings).map(Arc::new)
    }
}

impl fmt::Debug for TypeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeFactory").field("name", &self.name).finish()
    }
}

/// What an item or type names as its parent.
#[derive(Debug, Clone)]
pub enum TypeRef {
    /// An already-built instance
    Direct(Arc<DataType>),
    /// A factory not yet instantiated
    Factory { factory: TypeFactory, settings: Value },
    /// A registered type name such as `"string"`
    Alias { name: String, settings: Value },
}

impl TypeRef {
    pub fn alias(name: impl Into<String>) -> Self {
        Self::Alias {
            name: name.into(),
            settings: Value::Null,
        }
    }

    pub fn alias_with(name: impl Into<String>, settings: Value) -> Self {
        Self::Alias {
            name: name.into(),
            settings,
        }
    }

    pub fn factory(factory: TypeFactory) -> Self {
        Self::Factory {
            factory,
            settings: Value::Null,
        }
    }

    pub fn factory_with(factory: TypeFactory, settings: Value) -> Self {
        Self::Factory { factory, settings }
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        match self {
            Self::Direct(t) => t.type_label().unwrap_or("anonymous").to_string(),
            Self::Factory { factory, .. } => factory.name().to_string(),
            Self::Alias { name, .. } => name.clone(),
        }
    }
}

impl From<Arc<DataType>> for TypeRef {
    fn from(t: Arc<DataType>) -> Self {
        Self::Direct(t)
    }
}

impl From<DataType> for TypeRef {
    fn from(t: DataType) -> Self {
        Self::Direct(Arc::new(t))
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        Self::alias(name)
    }
}
