//! Asset classification
//!
//! Decides per file whether binary/media content is inlined as a `data:` URI
//! or emitted under a content-hashed name. Files strictly smaller than the
//! threshold are inlined; a file of exactly `threshold` bytes is emitted.
//!
//! The hash depends on content only, so unchanged files keep their output
//! name across builds and across any evaluation order.

mod template;

pub use template::{OutputTemplate, HASH_LEN};

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Handler name that marks a rule as an asset rule.
pub const ASSET_HANDLER: &str = "asset";

/// Asset classifier configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("invalid inline threshold {0}: must be positive")]
    InvalidThreshold(u64),

    #[error("invalid output template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid asset options: {0}")]
    InvalidOptions(String),
}

/// Inline or emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetMode {
    Inline,
    Emitted,
}

/// Per-file classification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDecision {
    pub mode: AssetMode,

    /// Output path for emitted assets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    /// `data:` URI for inline assets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_uri: Option<String>,

    pub size_bytes: u64,

    /// Full SHA-256 of the content
    pub content_hash: String,
}

impl AssetDecision {
    pub fn is_inline(&self) -> bool {
        self.mode == AssetMode::Inline
    }
}

/// Options of the `asset` handler, as declared in a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetOptions {
    /// Files smaller than this many bytes are inlined
    pub max_inline_bytes: u64,

    /// Output template for emitted files
    pub filename: String,
}

impl AssetOptions {
    pub fn from_value(options: &serde_json::Value) -> Result<Self, AssetError> {
        serde_json::from_value(options.clone()).map_err(|e| AssetError::InvalidOptions(e.to_string()))
    }
}

/// Read-only classifier for one asset rule.
#[derive(Debug, Clone)]
pub struct AssetClassifier {
    threshold: u64,
    template: OutputTemplate,
}

impl AssetClassifier {
    pub fn new(threshold: u64, template: &str) -> Result<Self, AssetError> {
        if threshold == 0 {
            return Err(AssetError::InvalidThreshold(threshold));
        }
        let template = OutputTemplate::parse(template).map_err(|reason| AssetError::InvalidTemplate {
            template: template.to_string(),
            reason,
        })?;
        Ok(Self { threshold, template })
    }

    pub fn from_options(options: &AssetOptions) -> Result<Self, AssetError> {
        Self::new(options.max_inline_bytes, &options.filename)
    }

    /// Classify one file's content. `source` is its relative path.
    pub fn classify(&self, source: &str, bytes: &[u8]) -> AssetDecision {
        let size_bytes = bytes.len() as u64;
        let content_hash = content_hash(bytes);
        // `img/a.jpeg?v=2` names the file `img/a.jpeg`
        let base = source.split_once('?').map(|(p, _)| p).unwrap_or(source);
        let path = Path::new(base);
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let decision = if size_bytes < self.threshold {
            AssetDecision {
                mode: AssetMode::Inline,
                output_path: None,
                data_uri: Some(data_uri(mime_for(&ext), bytes)),
                size_bytes,
                content_hash,
            }
        } else {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let output = self.template.render(&name, &content_hash[..HASH_LEN], &ext);
            AssetDecision {
                mode: AssetMode::Emitted,
                output_path: Some(output),
                data_uri: None,
                size_bytes,
                content_hash,
            }
        };

        tracing::debug!(
            source,
            size = size_bytes,
            mode = ?decision.mode,
            "classified asset"
        );
        decision
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn template(&self) -> &OutputTemplate {
        &self.template
    }
}

/// One-shot classification without keeping a classifier around.
pub fn classify(
    bytes: &[u8],
    threshold: u64,
    template: &str,
    source: &str,
) -> Result<AssetDecision, AssetError> {
    Ok(AssetClassifier::new(threshold, template)?.classify(source, bytes))
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// MIME type by extension (with dot), for data URIs.
fn mime_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".avif" => "image/avif",
        ".svg" => "image/svg+xml",
        ".woff" => "font/woff",
        ".woff2" => "font/woff2",
        ".ttf" => "font/ttf",
        ".otf" => "font/otf",
        ".eot" => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}
