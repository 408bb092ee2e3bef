//! Single-parent data type chains
//!
//! A [`DataType`] optionally extends a parent type. Validation, coercion and
//! normalization run the type's own logic interleaved with exactly one call
//! into the parent chain, so no type needs to know how deep its ancestry is.
//! Every chain ends at the shared [`DataType::primitive`] root.
//!
//! # Example
//!
//! ```
//! use cfgraph_types::{DataType, ValidationError};
//! use serde_json::json;
//!
//! let even = DataType::builder("even")
//!     .validate(|value, _settings| match value.as_i64() {
//!         Some(n) if n % 2 == 0 => Ok(()),
//!         _ => Err(vec![ValidationError::new("must be even")]),
//!     })
//!     .build();
//!
//! assert!(even.validate(&json!(4)).is_ok());
//! assert!(even.validate(&json!(3)).is_err());
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoercionError, ValidationError};
use crate::metadata::{TypeMetadata, UsePhase};
use crate::value::is_empty;

/// Label of the root marker type every chain terminates in.
pub const PRIMITIVE_LABEL: &str = "primitive";

pub type ValidateFn =
    Arc<dyn Fn(&Value, &Value) -> Result<(), Vec<ValidationError>> + Send + Sync>;
pub type CoerceFn = Arc<dyn Fn(Value, &Value) -> Result<Value, CoercionError> + Send + Sync>;
pub type NormalizeFn = Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>;

static PRIMITIVE: LazyLock<Arc<DataType>> = LazyLock::new(|| {
    Arc::new(DataType {
        label: Some(PRIMITIVE_LABEL.to_string()),
        parent: None,
        settings: Value::Null,
        validate: None,
        coerce: None,
        normalize: None,
        validate_order: AncestorOrder::Skip,
        coerce_order: AncestorOrder::Skip,
        metadata: TypeMetadata::default(),
    })
});

/// Where a type's own logic runs relative to its ancestors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AncestorOrder {
    /// Parent chain first, then this type
    #[default]
    Before,
    /// This type first, then the parent chain
    After,
    /// Parent chain is not consulted
    Skip,
}

/// One link in a type chain.
#[derive(Clone)]
pub struct DataType {
    label: Option<String>,
    parent: Option<Arc<DataType>>,
    settings: Value,
    validate: Option<ValidateFn>,
    coerce: Option<CoerceFn>,
    normalize: Option<NormalizeFn>,
    validate_order: AncestorOrder,
    coerce_order: AncestorOrder,
    metadata: TypeMetadata,
}

impl DataType {
    /// The shared root of every chain.
    pub fn primitive() -> Arc<DataType> {
        Arc::clone(&PRIMITIVE)
    }

    /// Start building a labeled type.
    pub fn builder(label: impl Into<String>) -> DataTypeBuilder {
        DataTypeBuilder::new(Some(label.into()))
    }

    /// Start building an anonymous type, e.g. the per-item type of a config node.
    pub fn anonymous() -> DataTypeBuilder {
        DataTypeBuilder::new(None)
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<DataType>> {
        self.parent.as_ref()
    }

    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Metadata declared directly on this link, without inheritance.
    pub fn own_metadata(&self) -> &TypeMetadata {
        &self.metadata
    }

    pub fn is_primitive_root(&self) -> bool {
        self.parent.is_none() && self.label.as_deref() == Some(PRIMITIVE_LABEL)
    }

    /// This type followed by each ancestor, ending at the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &DataType> {
        std::iter::successors(Some(self), |t| t.parent.as_deref())
    }

    /// Nearest labeled type in the chain, used as the display name.
    pub fn type_label(&self) -> Option<&str> {
        self.ancestors().find_map(|t| t.label.as_deref())
    }

    /// Whether `other` appears anywhere in this chain (including `self`).
    ///
    /// Labeled types match by label so separate instances of one factory
    /// are recognized; unlabeled types match by identity.
    pub fn extends(&self, other: &DataType) -> bool {
        self.ancestors().any(|t| t.same_type(other))
    }

    fn same_type(&self, other: &DataType) -> bool {
        match (&self.label, &other.label) {
            (Some(a), Some(b)) => a == b,
            _ => std::ptr::eq(self, other),
        }
    }

    fn inherited<T>(&self, field: impl Fn(&TypeMetadata) -> Option<T>) -> Option<T> {
        self.ancestors().find_map(|t| field(&t.metadata))
    }

    pub fn summary(&self) -> Option<String> {
        self.inherited(|m| m.summary.clone())
    }

    pub fn description(&self) -> Option<String> {
        self.inherited(|m| m.description.clone())
    }

    pub fn is_sensitive(&self) -> bool {
        self.inherited(|m| m.sensitive).unwrap_or(false)
    }

    pub fn is_required(&self) -> bool {
        self.inherited(|m| m.required).unwrap_or(false)
    }

    pub fn is_dynamic(&self) -> bool {
        self.inherited(|m| m.dynamic).unwrap_or(false)
    }

    pub fn use_at(&self) -> Vec<UsePhase> {
        self.inherited(|m| m.use_at.clone()).unwrap_or_default()
    }

    pub fn import_env_key(&self) -> Option<String> {
        self.inherited(|m| m.import_env_key.clone())
    }

    pub fn export_env_key(&self) -> Option<String> {
        self.inherited(|m| m.export_env_key.clone())
    }

    pub fn examples(&self) -> Vec<Value> {
        self.inherited(|m| m.examples.clone()).unwrap_or_default()
    }

    /// Flattened view of the inherited metadata.
    pub fn effective_metadata(&self) -> TypeMetadata {
        let mut merged = TypeMetadata::default();
        let chain: Vec<&DataType> = self.ancestors().collect();
        for link in chain.into_iter().rev() {
            merged.merge(&link.metadata);
        }
        merged
    }

    /// Validate a value against the whole chain.
    ///
    /// Empty values short-circuit: required types report
    /// [`ValidationError::empty_required`], optional types accept them.
    /// Otherwise every violation in the chain is collected.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<ValidationError>> {
        if is_empty(value) {
            return if self.is_required() {
                Err(vec![ValidationError::empty_required()])
            } else {
                Ok(())
            };
        }
        let errors = self.validate_chain(value);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_chain(&self, value: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.validate_order == AncestorOrder::Before {
            if let Some(parent) = &self.parent {
                errors.extend(parent.validate_chain(value));
            }
        }
        if let Some(validate) = &self.validate {
            if let Err(own) = validate(value, &self.settings) {
                errors.extend(own);
            }
        }
        if self.validate_order == AncestorOrder::After {
            if let Some(parent) = &self.parent {
                errors.extend(parent.validate_chain(value));
            }
        }
        errors
    }

    /// Coerce a value through the chain. Empty values pass through untouched.
    pub fn coerce(&self, value: Value) -> Result<Value, CoercionError> {
        if is_empty(&value) {
            return Ok(value);
        }
        self.coerce_chain(value)
    }

    fn coerce_chain(&self, mut value: Value) -> Result<Value, CoercionError> {
        if self.coerce_order == AncestorOrder::Before {
            if let Some(parent) = &self.parent {
                value = parent.coerce_chain(value)?;
            }
        }
        if let Some(coerce) = &self.coerce {
            value = coerce(value, &self.settings)?;
        }
        if self.coerce_order == AncestorOrder::After {
            if let Some(parent) = &self.parent {
                value = parent.coerce_chain(value)?;
            }
        }
        Ok(value)
    }

    /// Normalize a value, ancestors first. Empty values pass through.
    pub fn normalize(&self, value: Value) -> Value {
        if is_empty(&value) {
            return value;
        }
        self.normalize_chain(value)
    }

    fn normalize_chain(&self, mut value: Value) -> Value {
        if let Some(parent) = &self.parent {
            value = parent.normalize_chain(value);
        }
        match &self.normalize {
            Some(normalize) => normalize(value, &self.settings),
            None => value,
        }
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataType")
            .field("label", &self.label)
            .field("parent", &self.parent.as_ref().and_then(|p| p.type_label()))
            .field("settings", &self.settings)
            .field("validate_order", &self.validate_order)
            .field("coerce_order", &self.coerce_order)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Builder for [`DataType`]. Types built without an explicit parent
/// extend the primitive root.
pub struct DataTypeBuilder {
    inner: DataType,
}

impl DataTypeBuilder {
    fn new(label: Option<String>) -> Self {
        Self {
            inner: DataType {
                label,
                parent: Some(DataType::primitive()),
                settings: Value::Null,
                validate: None,
                coerce: None,
                normalize: None,
                validate_order: AncestorOrder::Before,
                coerce_order: AncestorOrder::Before,
                metadata: TypeMetadata::default(),
            },
        }
    }

    pub fn extends(mut self, parent: Arc<DataType>) -> Self {
        self.inner.parent = Some(parent);
        self
    }

    pub fn settings(mut self, settings: Value) -> Self {
        self.inner.settings = settings;
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<(), Vec<ValidationError>> + Send + Sync + 'static,
    {
        self.inner.validate = Some(Arc::new(f));
        self
    }

    pub fn coerce<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Value) -> Result<Value, CoercionError> + Send + Sync + 'static,
    {
        self.inner.coerce = Some(Arc::new(f));
        self
    }

    /// Like [`validate`](Self::validate), for an already shared function.
    pub fn validate_fn(mut self, f: ValidateFn) -> Self {
        self.inner.validate = Some(f);
        self
    }

    pub fn coerce_fn(mut self, f: CoerceFn) -> Self {
        self.inner.coerce = Some(f);
        self
    }

    pub fn normalize<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.inner.normalize = Some(Arc::new(f));
        self
    }

    pub fn validate_order(mut self, order: AncestorOrder) -> Self {
        self.inner.validate_order = order;
        self
    }

    pub fn coerce_order(mut self, order: AncestorOrder) -> Self {
        self.inner.coerce_order = order;
        self
    }

    pub fn metadata(mut self, metadata: TypeMetadata) -> Self {
        self.inner.metadata = metadata;
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.inner.metadata.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.inner.metadata.description = Some(description.into());
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.inner.metadata.sensitive = Some(sensitive);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.inner.metadata.required = Some(required);
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.inner.metadata.dynamic = Some(dynamic);
        self
    }

    pub fn build(self) -> DataType {
        self.inner
    }

    pub fn build_arc(self) -> Arc<DataType> {
        Arc::new(self.inner)
    }
}
