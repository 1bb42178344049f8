//! Effective configuration with full provenance
//!
//! The effective config is the composed object plus the list of layers that
//! contributed to it, so every value can be traced back to a layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

use super::layer::{ConfigLayer, LayerOrigin};
use super::merge::{compose, resolve_strategies, ComposeError, StrategyTable};
use super::select::{select_layers, Mode};
use super::spec::PipelineSpec;

/// Schema version for effective_config.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "packcfg/effective_config@1";

/// A contributing layer with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Layer name
    pub name: String,

    /// Origin of this layer
    pub origin: LayerOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl From<&ConfigLayer> for ConfigSource {
    fn from(layer: &ConfigLayer) -> Self {
        Self {
            name: layer.name().to_string(),
            origin: layer.origin().clone(),
            path: layer.path().map(|p| p.to_string_lossy().to_string()),
            digest: layer.digest().map(str::to_string),
        }
    }
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// Mode the layers were selected for, if selected by mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    /// The merged configuration object
    pub config: Value,

    /// Explicit merge strategies in force
    pub strategies: StrategyTable,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Compose an ordered layer list.
    pub fn compose(layers: &[ConfigLayer]) -> Result<Self, ConfigError> {
        let strategies = resolve_strategies(layers)?;
        let config = compose(layers)?;

        tracing::info!(
            layers = layers.len(),
            names = %layers.iter().map(|l| l.name()).collect::<Vec<_>>().join(","),
            "composed effective config"
        );

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            mode: None,
            config,
            strategies,
            sources: layers.iter().map(ConfigSource::from).collect(),
        })
    }

    /// Built-in layers for `mode`, then `extra` layers (files, CLI), composed.
    pub fn build(mode: Mode, extra: &[ConfigLayer]) -> Result<Self, ConfigError> {
        let mut layers = select_layers(mode)?;
        layers.extend(extra.iter().cloned());

        let mut effective = Self::compose(&layers)?;
        effective.mode = Some(mode);
        Ok(effective)
    }

    /// Typed view of the merged object, validated.
    pub fn pipeline_spec(&self) -> Result<PipelineSpec, ConfigError> {
        PipelineSpec::from_value(&self.config)
    }

    /// SHA-256 over the JCS-canonical merged object.
    ///
    /// Independent of `created_at` and provenance, so two compositions of
    /// the same layers share a fingerprint.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let canonical = serde_json_canonicalizer::to_vec(&self.config)
            .map_err(|e| ConfigError::Validation(format!("canonicalization failed: {}", e)))?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON serialization failed: {}", e),
            )
        })?;
        fs::write(path, json)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get a config value as string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }

    /// Get a config value as bool
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}
