//! `boolean` type

use serde_json::Value;

use crate::data_type::DataType;
use crate::error::{CoercionError, Result, ValidationError};
use crate::type_ref::TypeFactory;
use crate::value::value_kind;

pub const LABEL: &str = "boolean";

const TRUTHY: &[&str] = &["true", "1", "yes", "on", "t", "y"];
const FALSY: &[&str] = &["false", "0", "no", "off", "f", "n"];

pub fn factory() -> TypeFactory {
    TypeFactory::new(LABEL, build)
}

pub fn build(settings: &Value) -> Result<DataType> {
    Ok(DataType::builder(LABEL)
        .settings(settings.clone())
        .summary("A boolean")
        .coerce(|value, _| coerce(value))
        .validate(|value, _| match value {
            Value::Bool(_) => Ok(()),
            other => Err(vec![ValidationError::new(format!(
                "Expected a boolean, got {}",
                value_kind(other)
            ))]),
        })
        .build())
}

fn coerce(value: Value) -> std::result::Result<Value, CoercionError> {
    match &value {
        Value::Bool(_) => Ok(value),
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            if TRUTHY.contains(&lowered.as_str()) {
                Ok(Value::Bool(true))
            } else if FALSY.contains(&lowered.as_str()) {
                Ok(Value::Bool(false))
            } else {
                Err(CoercionError::new(format!("Unable to coerce \"{s}\" to a boolean"))
                    .with_tip("Use one of true/false, yes/no, on/off, 1/0"))
            }
        }
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Ok(Value::Bool(false)),
            Some(x) if x == 1.0 => Ok(Value::Bool(true)),
            _ => Err(CoercionError::new(format!("Unable to coerce {n} to a boolean"))),
        },
        other => Err(CoercionError::new(format!(
            "Unable to coerce {} to a boolean",
            value_kind(other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("true"), true)]
    #[case(json!("YES"), true)]
    #[case(json!(" off "), false)]
    #[case(json!("0"), false)]
    #[case(json!(1), true)]
    #[case(json!(false), false)]
    fn test_coerce(#[case] input: Value, #[case] expected: bool) {
        let t = build(&Value::Null).unwrap();
        assert_eq!(t.coerce(input).unwrap(), json!(expected));
    }

    #[test]
    fn test_coerce_rejects_garbage() {
        let t = build(&Value::Null).unwrap();
        let err = t.coerce(json!("maybe")).unwrap_err();
        assert!(err.tip.is_some());
        assert!(t.coerce(json!(2)).is_err());
    }

    #[test]
    fn test_validate_requires_bool() {
        let t = build(&Value::Null).unwrap();
        assert!(t.validate(&json!(true)).is_ok());
        assert!(t.validate(&json!("true")).is_err());
    }
}
