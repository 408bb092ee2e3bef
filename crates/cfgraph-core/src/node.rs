//! Config nodes and their resolution pipeline
//!
//! A node moves through `Unresolved -> Overriding -> Resolving -> Coercing
//! -> Validating -> Done`. Any failure moves it to `Errored` and stops the
//! pipeline for that node only.

use std::fmt;
use std::sync::Arc;

use cfgraph_types::{CoercionError, DataType, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ResolverContext;
use crate::error::{ResolutionError, SchemaError};
use crate::logging::redact;
use crate::overrides::{AppliedOverride, OverrideStack};
use crate::resolver::Resolver;

/// Pipeline position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    Unresolved,
    Overriding,
    Resolving,
    Coercing,
    Validating,
    Done,
    Errored,
}

/// One configuration item within a service.
#[derive(Clone)]
pub struct ConfigNode {
    key: String,
    service: String,
    data_type: Arc<DataType>,
    resolver: Resolver,
    phase: NodePhase,
    resolved_raw_value: Option<Value>,
    resolved_value: Option<Value>,
    is_resolved: bool,
    validation_errors: Vec<ValidationError>,
    coercion_error: Option<CoercionError>,
    resolution_error: Option<ResolutionError>,
    schema_errors: Vec<SchemaError>,
    overrides: Vec<AppliedOverride>,
}

impl ConfigNode {
    pub fn new(
        service: impl Into<String>,
        key: impl Into<String>,
        data_type: Arc<DataType>,
        resolver: Resolver,
    ) -> Self {
        Self {
            key: key.into(),
            service: service.into(),
            data_type,
            resolver,
            phase: NodePhase::Unresolved,
            resolved_raw_value: None,
            resolved_value: None,
            is_resolved: false,
            validation_errors: Vec::new(),
            coercion_error: None,
            resolution_error: None,
            schema_errors: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// A node whose declaration is broken. It never resolves.
    pub fn invalid(service: impl Into<String>, key: impl Into<String>, error: SchemaError) -> Self {
        let mut node = Self::new(
            service,
            key,
            DataType::anonymous().build_arc(),
            Resolver::static_value(Value::Null),
        );
        node.schema_errors.push(error);
        node
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// `service.key`
    pub fn path(&self) -> String {
        format!("{}.{}", self.service, self.key)
    }

    pub fn data_type(&self) -> &Arc<DataType> {
        &self.data_type
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn phase(&self) -> NodePhase {
        self.phase
    }

    pub fn resolved_raw_value(&self) -> Option<&Value> {
        self.resolved_raw_value.as_ref()
    }

    pub fn resolved_value(&self) -> Option<&Value> {
        self.resolved_value.as_ref()
    }

    /// A value was produced and coerced. Validation may still have failed.
    pub fn is_resolved(&self) -> bool {
        self.is_resolved
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        &self.validation_errors
    }

    pub fn coercion_error(&self) -> Option<&CoercionError> {
        self.coercion_error.as_ref()
    }

    pub fn resolution_error(&self) -> Option<&ResolutionError> {
        self.resolution_error.as_ref()
    }

    pub fn schema_errors(&self) -> &[SchemaError] {
        &self.schema_errors
    }

    pub fn push_schema_error(&mut self, error: SchemaError) {
        self.schema_errors.push(error);
    }

    /// Every enabled override holding a value; the first one was applied.
    pub fn overrides(&self) -> &[AppliedOverride] {
        &self.overrides
    }

    pub fn is_schema_valid(&self) -> bool {
        self.schema_errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.is_schema_valid()
            && self.is_resolved
            && self.coercion_error.is_none()
            && self.resolution_error.is_none()
            && self.validation_errors.is_empty()
    }

    pub fn is_sensitive(&self) -> bool {
        self.data_type.is_sensitive()
    }

    pub fn is_dynamic(&self) -> bool {
        self.data_type.is_dynamic()
    }

    /// Run the full pipeline. Failures are recorded on the node.
    pub async fn resolve(
        &mut self,
        ctx: &ResolverContext,
        overrides: &OverrideStack,
        environment: Option<&str>,
    ) {
        self.reset();
        if !self.schema_errors.is_empty() {
            self.phase = NodePhase::Errored;
            return;
        }

        self.phase = NodePhase::Overriding;
        let import_key = self.data_type.import_env_key();
        self.overrides = overrides.lookup(&self.key, import_key.as_deref(), environment);

        let raw = match self.overrides.first() {
            Some(applied) => {
                tracing::debug!(
                    item = %self.path(),
                    source = %applied.label,
                    "Using override value"
                );
                applied.value.clone()
            }
            None => {
                self.phase = NodePhase::Resolving;
                match self.resolver.resolve(ctx).await {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::debug!(item = %self.path(), error = %err, "Resolution failed");
                        self.resolution_error = Some(err);
                        self.phase = NodePhase::Errored;
                        return;
                    }
                }
            }
        };
        self.resolved_raw_value = Some(raw.clone());

        self.phase = NodePhase::Coercing;
        let coerced = match self.data_type.coerce(raw) {
            Ok(value) => self.data_type.normalize(value),
            Err(err) => {
                tracing::debug!(item = %self.path(), error = %err, "Coercion failed");
                self.coercion_error = Some(err);
                self.phase = NodePhase::Errored;
                return;
            }
        };
        self.is_resolved = true;

        self.phase = NodePhase::Validating;
        let outcome = self.data_type.validate(&coerced);
        self.resolved_value = Some(coerced);
        match outcome {
            Ok(()) => self.phase = NodePhase::Done,
            Err(errors) => {
                tracing::debug!(
                    item = %self.path(),
                    count = errors.len(),
                    "Validation failed"
                );
                self.validation_errors = errors;
                self.phase = NodePhase::Errored;
            }
        }
    }

    fn reset(&mut self) {
        self.phase = NodePhase::Unresolved;
        self.resolved_raw_value = None;
        self.resolved_value = None;
        self.is_resolved = false;
        self.validation_errors.clear();
        self.coercion_error = None;
        self.resolution_error = None;
        self.overrides.clear();
    }
}

impl fmt::Debug for ConfigNode {
    /// Values of sensitive nodes are masked. Override values are left out.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sensitive = self.is_sensitive();
        let shown = |value: &Option<Value>| {
            value.as_ref().map(|value| {
                let text = value.to_string();
                if sensitive { redact(&text) } else { text }
            })
        };
        f.debug_struct("ConfigNode")
            .field("path", &self.path())
            .field("data_type", &self.data_type)
            .field("resolver", &self.resolver)
            .field("phase", &self.phase)
            .field("resolved_raw_value", &shown(&self.resolved_raw_value))
            .field("resolved_value", &shown(&self.resolved_value))
            .field("is_resolved", &self.is_resolved)
            .field("validation_errors", &self.validation_errors)
            .field("coercion_error", &self.coercion_error)
            .field("resolution_error", &self.resolution_error)
            .field("schema_errors", &self.schema_errors)
            .field(
                "overrides",
                &self.overrides.iter().map(|o| o.label.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
