//! `number` type

use serde::Deserialize;
use serde_json::Value;

use super::parse_settings;
use crate::data_type::DataType;
use crate::error::{CoercionError, Result, ValidationError};
use crate::type_ref::TypeFactory;
use crate::value::{number_value, value_kind};

pub const LABEL: &str = "number";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NumberSettings {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub is_divisible_by: Option<f64>,
    #[serde(default)]
    pub is_int: bool,
    pub precision: Option<u32>,
}

pub fn factory() -> TypeFactory {
    TypeFactory::new(LABEL, build)
}

pub fn build(settings: &Value) -> Result<DataType> {
    let parsed: NumberSettings = parse_settings(LABEL, settings)?;
    let precision = parsed.precision;
    Ok(DataType::builder(LABEL)
        .settings(settings.clone())
        .summary("A number")
        .coerce(move |value, _| coerce(value, precision))
        .validate(move |value, _| validate(value, &parsed))
        .build())
}

fn coerce(value: Value, precision: Option<u32>) -> std::result::Result<Value, CoercionError> {
    let n = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| {
        CoercionError::new(format!("Unable to coerce {} to a number", describe(&value)))
    })?;

    let n = match precision {
        Some(p) => {
            let factor = 10f64.powi(p as i32);
            (n * factor).round() / factor
        }
        None => n,
    };
    number_value(n).ok_or_else(|| CoercionError::new("Number is not representable"))
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => value_kind(other).to_string(),
    }
}

fn validate(value: &Value, settings: &NumberSettings) -> std::result::Result<(), Vec<ValidationError>> {
    let Some(n) = value.as_f64() else {
        return Err(vec![ValidationError::new(format!(
            "Expected a number, got {}",
            value_kind(value)
        ))]);
    };
    let mut errors = Vec::new();
    if let Some(min) = settings.min {
        if n < min {
            errors.push(ValidationError::new(format!("Must be >= {min}")));
        }
    }
    if let Some(max) = settings.max {
        if n > max {
            errors.push(ValidationError::new(format!("Must be <= {max}")));
        }
    }
    if settings.is_int && n.fract() != 0.0 {
        errors.push(ValidationError::new("Must be an integer"));
    }
    if let Some(divisor) = settings.is_divisible_by {
        if divisor != 0.0 && !is_multiple(n, divisor) {
            errors.push(ValidationError::new(format!("Must be divisible by {divisor}")));
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Whether `n / divisor` is integral, within a tolerance relative to the quotient.
fn is_multiple(n: f64, divisor: f64) -> bool {
    let quotient = n / divisor;
    (quotient - quotient.round()).abs() <= 1e-9 * quotient.abs().max(1.0)
}
