//! Configuration layers
//!
//! A layer is an immutable, named configuration fragment plus the merge
//! strategies it declares for its fields. Layer files are TOML:
//!
//! ```toml
//! mode = "development"
//!
//! [layer]
//! name = "dev"
//!
//! [layer.strategies]
//! "module.rules" = "append"
//! ```
//!
//! The `[layer]` table is metadata; every other key is a field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::effective::ConfigError;

/// How a field combines across layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Last declaring layer wins.
    Replace,
    /// Concatenate arrays in layer order.
    Append,
    /// Recurse into objects, applying strategies per nested field.
    DeepMerge,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeStrategy::Replace => "replace",
            MergeStrategy::Append => "append",
            MergeStrategy::DeepMerge => "deep-merge",
        };
        f.write_str(s)
    }
}

/// Where a layer came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerOrigin {
    /// Built into the binary (base and mode layers).
    Builtin,
    /// Loaded from a TOML file.
    File,
    /// Command-line overrides.
    Cli,
}

/// Immutable configuration fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    name: String,
    origin: LayerOrigin,
    path: Option<PathBuf>,
    digest: Option<String>,
    fields: Map<String, Value>,
    strategies: BTreeMap<String, MergeStrategy>,
}

/// Metadata table of a layer file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayerMeta {
    name: Option<String>,
    #[serde(default)]
    strategies: BTreeMap<String, MergeStrategy>,
}

/// Reserved top-level key holding layer metadata in layer files.
pub const LAYER_META_KEY: &str = "layer";

impl ConfigLayer {
    /// Create a layer from a JSON object.
    pub fn new(name: impl Into<String>, fields: Value) -> Result<Self, ConfigError> {
        let name = name.into();
        let fields = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ConfigError::Validation(format!(
                    "layer '{}': fields must be a table, found {}",
                    name,
                    value_kind(&other)
                )))
            }
        };

        Ok(Self {
            name,
            origin: LayerOrigin::Builtin,
            path: None,
            digest: None,
            fields,
            strategies: BTreeMap::new(),
        })
    }

    /// Declare a merge strategy for a dotted field path.
    pub fn with_strategy(mut self, field: impl Into<String>, strategy: MergeStrategy) -> Self {
        self.strategies.insert(field.into(), strategy);
        self
    }

    pub fn with_origin(mut self, origin: LayerOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Load a layer from a TOML file; the name defaults to the file stem.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes).map_err(|e| {
            ConfigError::Parse(format!("{}: invalid UTF-8: {}", path.display(), e))
        })?;

        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "layer".to_string());

        let mut layer = Self::from_toml_str(&contents, &fallback)
            .map_err(|e| match e {
                ConfigError::Parse(msg) => ConfigError::Parse(format!("{}: {}", path.display(), msg)),
                other => other,
            })?;
        layer.origin = LayerOrigin::File;
        layer.path = Some(path.to_path_buf());
        layer.digest = Some(digest);
        Ok(layer)
    }

    /// Parse a layer from TOML text.
    pub fn from_toml_str(contents: &str, default_name: &str) -> Result<Self, ConfigError> {
        let toml_value: toml::Value = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;

        let mut fields = match toml_to_json(toml_value) {
            Value::Object(map) => map,
            _ => return Err(ConfigError::Parse("layer file must be a table".to_string())),
        };

        let meta: LayerMeta = match fields.remove(LAYER_META_KEY) {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| ConfigError::Parse(format!("[{}] table: {}", LAYER_META_KEY, e)))?,
            None => LayerMeta::default(),
        };

        Ok(Self {
            name: meta.name.unwrap_or_else(|| default_name.to_string()),
            origin: LayerOrigin::File,
            path: None,
            digest: None,
            fields,
            strategies: meta.strategies,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &LayerOrigin {
        &self.origin
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// SHA-256 of the raw file bytes, for file layers.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Strategy this layer declares for a dotted field path, if any.
    pub fn strategy_for(&self, field: &str) -> Option<MergeStrategy> {
        self.strategies.get(field).copied()
    }

    pub fn strategies(&self) -> &BTreeMap<String, MergeStrategy> {
        &self.strategies
    }

    /// Field value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// Convert a TOML value to JSON.
pub(crate) fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Short type name for error messages.
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}
