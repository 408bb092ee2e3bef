//! Error types for cfgraph-types

use serde::{Deserialize, Serialize};

/// Result type for type construction and resolution
pub type Result<T> = std::result::Result<T, TypeError>;

/// Structural problems found while building or resolving a data type.
///
/// These surface as schema errors on the owning node; they never reach
/// value validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// A string alias did not match any registered type
    #[error("unknown data type '{name}'")]
    UnknownType { name: String },

    /// Settings passed to a type factory could not be parsed
    #[error("invalid settings for type '{type_label}': {message}")]
    InvalidSettings { type_label: String, message: String },

    /// A factory refused to build an instance
    #[error("failed to build type '{type_label}': {message}")]
    FactoryFailed { type_label: String, message: String },
}

/// Distinguishes the "required but empty" special case from ordinary failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationCode {
    EmptyRequired,
    Invalid,
}

/// A value failed one of the predicates in its type chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: ValidationCode::Invalid,
            message: message.into(),
            tip: None,
        }
    }

    /// The error every required type reports for an empty value.
    pub fn empty_required() -> Self {
        Self {
            code: ValidationCode::EmptyRequired,
            message: "Value is required but is currently empty".to_string(),
            tip: Some("Set a value, or mark the item as optional".to_string()),
        }
    }

    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }

    pub fn is_empty_required(&self) -> bool {
        self.code == ValidationCode::EmptyRequired
    }
}

/// A value could not be converted into the type's representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct CoercionError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

impl CoercionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tip: None,
        }
    }

    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }
}
