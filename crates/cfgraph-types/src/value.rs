//! Helpers for inspecting raw configuration values

use serde_json::Value;

use crate::type_ref::TypeRef;

/// `null` and the empty string both count as "no value".
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Short name of a value's runtime shape, used in error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Infer a type for an item that declares none.
///
/// Boolean and numeric literals map to the matching primitive; anything
/// else (including no literal at all) falls back to `string`.
pub fn infer_type(literal: Option<&Value>) -> TypeRef {
    match literal {
        Some(Value::Bool(_)) => TypeRef::alias("boolean"),
        Some(Value::Number(_)) => TypeRef::alias("number"),
        _ => TypeRef::alias("string"),
    }
}

/// Convert a float back into a JSON number, preferring an integer
/// representation when the value has no fractional part.
pub fn number_value(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(Value::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}
