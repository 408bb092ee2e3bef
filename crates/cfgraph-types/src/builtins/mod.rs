//! Built-in data types

pub mod boolean;
pub mod enumeration;
pub mod network;
pub mod number;
pub mod string;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, TypeError};

/// Parse factory settings, treating `null` as "all defaults".
pub(crate) fn parse_settings<T>(type_label: &str, settings: &Value) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if settings.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(settings.clone()).map_err(|e| TypeError::InvalidSettings {
        type_label: type_label.to_string(),
        message: e.to_string(),
    })
}
