//! `enum` type: the value must be one of a fixed list

use serde::Deserialize;
use serde_json::Value;

use crate::data_type::DataType;
use crate::error::{Result, TypeError, ValidationError};
use crate::type_ref::TypeFactory;

pub const LABEL: &str = "enum";

/// Settings may be the bare list or `{ "values": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EnumSettings {
    List(Vec<Value>),
    Table { values: Vec<Value> },
}

pub fn factory() -> TypeFactory {
    TypeFactory::new(LABEL, build)
}

pub fn build(settings: &Value) -> Result<DataType> {
    let values = match serde_json::from_value::<EnumSettings>(settings.clone()) {
        Ok(EnumSettings::List(values)) | Ok(EnumSettings::Table { values }) => values,
        Err(_) => {
            return Err(TypeError::InvalidSettings {
                type_label: LABEL.to_string(),
                message: "expected a list of allowed values".to_string(),
            });
        }
    };
    if values.is_empty() {
        return Err(TypeError::InvalidSettings {
            type_label: LABEL.to_string(),
            message: "at least one allowed value is required".to_string(),
        });
    }

    Ok(DataType::builder(LABEL)
        .settings(settings.clone())
        .summary("One of a fixed set of values")
        .validate(move |value, _| {
            if values.contains(value) {
                Ok(())
            } else {
                let listed: Vec<String> = values.iter().map(Value::to_string).collect();
                Err(vec![ValidationError::new(format!(
                    "Value must be one of: {}",
                    listed.join(", ")
                ))])
            }
        })
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_listed_values() {
        let t = build(&json!(["dev", "staging", "production"])).unwrap();
        assert!(t.validate(&json!("dev")).is_ok());
        let errors = t.validate(&json!("prod")).unwrap_err();
        assert!(errors[0].message.contains("\"production\""));
    }

    #[test]
    fn test_table_form() {
        let t = build(&json!({"values": [1, 2, 3]})).unwrap();
        assert!(t.validate(&json!(2)).is_ok());
        assert!(t.validate(&json!(4)).is_err());
    }

    #[test]
    fn test_requires_values() {
        assert!(build(&Value::Null).is_err());
        assert!(build(&json!([])).is_err());
    }
}
