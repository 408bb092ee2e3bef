//! Inheritable type metadata

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// When a value must be available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsePhase {
    /// Baked in at build time
    Build,
    /// Read when the process boots
    Boot,
}

/// Metadata a type declares for itself.
///
/// Every field is optional: an unset field is looked up on the parent
/// type, so a child only states what it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMetadata {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sensitive: Option<bool>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub use_at: Option<Vec<UsePhase>>,
    #[serde(default)]
    pub dynamic: Option<bool>,
    #[serde(default)]
    pub import_env_key: Option<String>,
    #[serde(default)]
    pub export_env_key: Option<String>,
    #[serde(default)]
    pub examples: Option<Vec<Value>>,
}

impl TypeMetadata {
    /// Overlay `other` onto `self`; fields set in `other` win.
    pub fn merge(&mut self, other: &TypeMetadata) {
        fn take<T: Clone>(base: &mut Option<T>, over: &Option<T>) {
            if over.is_some() {
                base.clone_from(over);
            }
        }
        take(&mut self.summary, &other.summary);
        take(&mut self.description, &other.description);
        take(&mut self.sensitive, &other.sensitive);
        take(&mut self.required, &other.required);
        take(&mut self.use_at, &other.use_at);
        take(&mut self.dynamic, &other.dynamic);
        take(&mut self.import_env_key, &other.import_env_key);
        take(&mut self.export_env_key, &other.export_env_key);
        take(&mut self.examples, &other.examples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overlays_set_fields_only() {
        let mut base = TypeMetadata {
            summary: Some("base".into()),
            sensitive: Some(true),
            ..Default::default()
        };
        let overlay = TypeMetadata {
            summary: Some("overlay".into()),
            required: Some(true),
            ..Default::default()
        };
        base.merge(&overlay);

        assert_eq!(base.summary.as_deref(), Some("overlay"));
        assert_eq!(base.sensitive, Some(true));
        assert_eq!(base.required, Some(true));
    }

    #[test]
    fn test_parse_from_json() {
        let meta: TypeMetadata = serde_json::from_value(serde_json::json!({
            "summary": "db url",
            "useAt": ["boot"],
            "exportEnvKey": "DATABASE_URL"
        }))
        .unwrap();
        assert_eq!(meta.use_at, Some(vec![UsePhase::Boot]));
        assert_eq!(meta.export_env_key.as_deref(), Some("DATABASE_URL"));
    }
}
