//! `string` type

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::parse_settings;
use crate::data_type::DataType;
use crate::error::{CoercionError, Result, TypeError, ValidationError};
use crate::type_ref::TypeFactory;
use crate::value::value_kind;

pub const LABEL: &str = "string";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StringSettings {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub is_length: Option<usize>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
    pub matches: Option<String>,
    #[serde(default)]
    pub to_upper_case: bool,
    #[serde(default)]
    pub to_lower_case: bool,
}

pub fn factory() -> TypeFactory {
    TypeFactory::new(LABEL, build)
}

pub fn build(settings: &Value) -> Result<DataType> {
    let parsed: StringSettings = parse_settings(LABEL, settings)?;
    let pattern = parsed
        .matches
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| TypeError::InvalidSettings {
            type_label: LABEL.to_string(),
            message: e.to_string(),
        })?;

    let coerce_settings = parsed.clone();
    Ok(DataType::builder(LABEL)
        .settings(settings.clone())
        .summary("A string")
        .coerce(move |value, _| coerce(value, &coerce_settings))
        .validate(move |value, _| validate(value, &parsed, pattern.as_ref()))
        .build())
}

fn coerce(value: Value, settings: &StringSettings) -> std::result::Result<Value, CoercionError> {
    let s = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(CoercionError::new(format!(
                "Cannot convert {} to a string",
                value_kind(&other)
            )));
        }
    };
    let s = if settings.to_upper_case {
        s.to_uppercase()
    } else if settings.to_lower_case {
        s.to_lowercase()
    } else {
        s
    };
    Ok(Value::String(s))
}

fn validate(
    value: &Value,
    settings: &StringSettings,
    pattern: Option<&Regex>,
) -> std::result::Result<(), Vec<ValidationError>> {
    let Some(s) = value.as_str() else {
        return Err(vec![ValidationError::new(format!(
            "Expected a string, got {}",
            value_kind(value)
        ))]);
    };
    let len = s.chars().count();
    let mut errors = Vec::new();

    if let Some(min) = settings.min_length {
        if len < min {
            errors.push(ValidationError::new(format!("Length must be >= {min}")));
        }
    }
    if let Some(max) = settings.max_length {
        if len > max {
            errors.push(ValidationError::new(format!("Length must be <= {max}")));
        }
    }
    if let Some(exact) = settings.is_length {
        if len != exact {
            errors.push(ValidationError::new(format!("Length must be exactly {exact}")));
        }
    }
    if let Some(prefix) = &settings.starts_with {
        if !s.starts_with(prefix.as_str()) {
            errors.push(ValidationError::new(format!("Value must start with \"{prefix}\"")));
        }
    }
    if let Some(suffix) = &settings.ends_with {
        if !s.ends_with(suffix.as_str()) {
            errors.push(ValidationError::new(format!("Value must end with \"{suffix}\"")));
        }
    }
    if let Some(re) = pattern {
        if !re.is_match(s) {
            errors.push(ValidationError::new(format!(
                "Value must match pattern {}",
                re.as_str()
            )));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
