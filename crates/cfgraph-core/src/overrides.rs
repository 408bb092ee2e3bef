//! Layered override sources
//!
//! An [`OverrideStack`] holds sources ordered most-specific first. Looking
//! up an item returns every enabled source that holds a value for it; the
//! first one is the value applied. Values are never merged across sources.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Origin category of an override source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    /// Process environment or dotenv files
    Environment,
    File,
    Custom,
}

/// Whether a source takes part in a pass, independent of its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enabled {
    Always,
    Never,
    /// Only when the current runtime environment has this name
    WhenEnvironment(String),
}

impl Enabled {
    pub fn is_enabled(&self, environment: Option<&str>) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::WhenEnvironment(name) => environment == Some(name.as_str()),
        }
    }
}

/// One layer of override values.
#[derive(Debug, Clone)]
pub struct OverrideSource {
    kind: OverrideKind,
    label: String,
    values: Map<String, Value>,
    enabled: Enabled,
    precedence: i32,
}

impl OverrideSource {
    pub fn new(kind: OverrideKind, label: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            kind,
            label: label.into(),
            values,
            enabled: Enabled::Always,
            precedence: 0,
        }
    }

    /// A source from a JSON object.
    pub fn from_json(kind: OverrideKind, label: impl Into<String>, value: Value) -> Result<Self> {
        let label = label.into();
        match value {
            Value::Object(map) => Ok(Self::new(kind, label, map)),
            other => Err(Error::OverrideParse {
                label,
                message: format!("expected an object, found {}", cfgraph_types::value_kind(&other)),
            }),
        }
    }

    /// A file source from TOML text. Tables become nested paths.
    pub fn from_toml(label: impl Into<String>, content: &str) -> Result<Self> {
        let label = label.into();
        let parsed: toml::Table = toml::from_str(content).map_err(|e| Error::OverrideParse {
            label: label.clone(),
            message: e.to_string(),
        })?;
        let value = serde_json::to_value(parsed)?;
        Self::from_json(OverrideKind::File, label, value)
    }

    /// An environment source from dotenv text.
    ///
    /// Supports `#` comments, an optional `export` prefix, and single or
    /// double quoted values. Every value is a string.
    pub fn from_dotenv(label: impl Into<String>, content: &str) -> Result<Self> {
        let label = label.into();
        let mut values = Map::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::OverrideParse {
                    label,
                    message: format!("line {}: expected KEY=value", index + 1),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::OverrideParse {
                    label,
                    message: format!("line {}: empty key", index + 1),
                });
            }
            values.insert(key.to_string(), Value::String(parse_dotenv_value(value)));
        }
        Ok(Self::new(OverrideKind::Environment, label, values))
    }

    /// An environment source from variable pairs. `__` in a name nests,
    /// so `DB__HOST` is found at path `DB.HOST`.
    pub fn from_env_vars<I, K, V>(label: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values = Map::new();
        for (name, value) in vars {
            let segments: Vec<&str> = name.as_ref().split("__").collect();
            insert_nested(&mut values, &segments, Value::String(value.into()));
        }
        Self::new(OverrideKind::Environment, label, values)
    }

    /// Load a source from a file, picking the format from its name:
    /// `*.toml`, `*.json`, otherwise dotenv.
    pub fn load(path: &Path) -> Result<Self> {
        let label = path.display().to_string();
        tracing::debug!(path = %label, "Loading override source");
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(label, &content),
            Some("json") => {
                let value: Value = serde_json::from_str(&content).map_err(|e| {
                    Error::OverrideParse {
                        label: label.clone(),
                        message: e.to_string(),
                    }
                })?;
                Self::from_json(OverrideKind::File, label, value)
            }
            _ => Self::from_dotenv(label, &content),
        }
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_enabled(mut self, enabled: Enabled) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable only for the named runtime environment.
    pub fn enabled_when(self, environment: impl Into<String>) -> Self {
        self.with_enabled(Enabled::WhenEnvironment(environment.into()))
    }

    pub fn kind(&self) -> OverrideKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    pub fn enabled(&self) -> &Enabled {
        &self.enabled
    }

    /// Value at `path`: the flat key first, then the dotted path walked
    /// through nested objects. `null` counts as absent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let found = self.values.get(path).or_else(|| {
            let mut segments = path.split('.');
            let first = self.values.get(segments.next()?)?;
            segments.try_fold(first, |current, segment| current.as_object()?.get(segment))
        })?;
        (!found.is_null()).then_some(found)
    }
}

fn parse_dotenv_value(raw: &str) -> String {
    let value = raw.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return value[1..value.len() - 1]
            .replace("\\n", "\n")
            .replace("\\\"", "\"");
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    match value.find(" #") {
        Some(comment) => value[..comment].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn insert_nested(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            map.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry((*first).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_nested(child, rest, value);
            }
        }
    }
}

/// A source that held a value for an item during lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedOverride {
    pub source_type: OverrideKind,
    pub label: String,
    pub value: Value,
}

/// Override sources for one service, most specific first.
#[derive(Debug, Clone, Default)]
pub struct OverrideStack {
    sources: Vec<OverrideSource>,
}

impl OverrideStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. Higher precedence sorts first; equal precedence keeps
    /// insertion order.
    pub fn push(&mut self, source: OverrideSource) {
        let at = self
            .sources
            .iter()
            .position(|s| s.precedence < source.precedence)
            .unwrap_or(self.sources.len());
        self.sources.insert(at, source);
    }

    pub fn with_source(mut self, source: OverrideSource) -> Self {
        self.push(source);
        self
    }

    pub fn sources(&self) -> &[OverrideSource] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Every enabled source with a value for `key`, in stack order.
    ///
    /// Environment sources check `import_env_key` before `key`.
    pub fn lookup(
        &self,
        key: &str,
        import_env_key: Option<&str>,
        environment: Option<&str>,
    ) -> Vec<AppliedOverride> {
        self.sources
            .iter()
            .filter(|source| source.enabled.is_enabled(environment))
            .filter_map(|source| {
                let imported = match (source.kind, import_env_key) {
                    (OverrideKind::Environment, Some(import)) => source.get(import),
                    _ => None,
                };
                let value = imported.or_else(|| source.get(key))?;
                Some(AppliedOverride {
                    source_type: source.kind,
                    label: source.label.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }
}
