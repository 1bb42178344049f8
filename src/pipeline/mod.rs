//! Pipeline execution entry point
//!
//! A [`Pipeline`] is built once per build from the effective config: the rule
//! table, the alias resolver and one asset classifier per asset rule. All of
//! it is read-only afterwards and can be shared across worker threads.
//!
//! Handlers are external; they are reached through [`HandlerInvoker`]. The
//! built-in `asset` handler is the exception: it classifies the bytes that
//! reach it instead of transforming them.

mod instrument;
mod source;
mod wrap;

pub use instrument::{
    AnalysisReport, AnalysisTotals, AssetStat, ChainTiming, ClassTotals, Instrument,
    InstrumentSet, Instruments, OutputAnalyzer, OutputClass, SpeedMeasure, TimingReport,
    ANALYSIS_SCHEMA_ID, TIMING_SCHEMA_ID,
};
pub use source::{collect_sources, SourceSet};
pub use wrap::{wrap, WrappedConfig, WrappedOutcome};

use packcfg_rules::{normalize_identifier, Handler, RuleError, RuleMatch, RuleTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::alias::{AliasError, PathAliasResolver};
use crate::asset::{AssetClassifier, AssetDecision, AssetError, AssetOptions, ASSET_HANDLER};
use crate::config::{ConfigError, EffectiveConfig, PipelineSpec};

/// Construction-time errors. Any of these fails the build before a file is
/// processed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Alias(#[from] AliasError),

    #[error("rule #{index}: {source}")]
    Asset {
        index: usize,
        #[source]
        source: AssetError,
    },

    #[error("rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },
}

/// Per-file errors. Collected, never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileError {
    #[error("no rule matches '{0}'")]
    NoRuleMatch(String),

    #[error("handler '{handler}' failed: {message}")]
    Handler { handler: String, message: String },

    #[error("unreadable: {0}")]
    Unreadable(String),
}

/// A source file handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the source root
    pub path: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

/// What a handler sees besides its input bytes.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub source: &'a str,
    pub resolver: &'a PathAliasResolver,
}

/// Bridge to the external transformation engines.
pub trait HandlerInvoker {
    /// Run one handler over `input`. The error is the engine's message.
    fn invoke(
        &self,
        handler: &Handler,
        input: &[u8],
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<u8>, String>;
}

/// Invoker that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl HandlerInvoker for PassThrough {
    fn invoke(&self, _: &Handler, input: &[u8], _: &HandlerContext<'_>) -> Result<Vec<u8>, String> {
        Ok(input.to_vec())
    }
}

/// What a matched file produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputKind {
    /// Chain output without asset classification
    Transformed { size_bytes: u64, content_hash: String },
    /// Classified by the `asset` handler
    Asset(AssetDecision),
}

/// Manifest entry for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub rule: usize,
    pub chain: String,
    #[serde(flatten)]
    pub output: OutputKind,
}

/// A file that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: FileError,
}

/// Result of running a batch of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    /// Source path → output, sorted by path
    pub manifest: BTreeMap<String, OutputEntry>,

    /// Files no rule matched, sorted
    pub unmatched: Vec<String>,

    /// Per-file failures, sorted by path
    pub failures: Vec<FileFailure>,
}

impl BuildOutput {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_clean(&self) -> bool {
        self.unmatched.is_empty() && self.failures.is_empty()
    }
}

/// Hooks around pipeline execution. Observers only ever get shared
/// references to build data.
pub trait BuildObserver {
    /// Whether chain invocations should be timed at all.
    fn timing_enabled(&self) -> bool {
        false
    }

    fn chain_finished(&mut self, _chain: &str, _elapsed: Duration) {}

    fn output_recorded(&mut self, _source: &str, _entry: &OutputEntry) {}
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// Resolved, read-only pipeline for one build.
#[derive(Debug, Clone)]
pub struct Pipeline {
    rules: RuleTable,
    resolver: PathAliasResolver,
    assets: BTreeMap<usize, AssetClassifier>,
}

impl Pipeline {
    pub fn from_config(config: &EffectiveConfig) -> Result<Self, PipelineError> {
        Self::from_spec(&config.pipeline_spec()?)
    }

    pub fn from_spec(spec: &PipelineSpec) -> Result<Self, PipelineError> {
        let rules = RuleTable::new(spec.module.rules.clone(), spec.module.duplicates)?;
        let resolver = PathAliasResolver::new(spec.alias_table(), spec.resolve.extensions.clone())?;

        let mut assets = BTreeMap::new();
        for rule in rules.rules() {
            let handlers = rule.chain().handlers();
            let Some(position) = handlers.iter().position(|h| h.name == ASSET_HANDLER) else {
                continue;
            };

            // asset classifies the final bytes, so it must be applied last
            if position != 0 || handlers.iter().filter(|h| h.name == ASSET_HANDLER).count() > 1 {
                return Err(PipelineError::InvalidRule {
                    index: rule.index,
                    reason: format!("'{}' must be the first declared handler, once", ASSET_HANDLER),
                });
            }

            let classifier = AssetOptions::from_value(&handlers[0].options)
                .and_then(|options| AssetClassifier::from_options(&options))
                .map_err(|source| PipelineError::Asset {
                    index: rule.index,
                    source,
                })?;
            assets.insert(rule.index, classifier);
        }

        tracing::info!(
            rules = rules.len(),
            asset_rules = assets.len(),
            shadowed = rules.shadowed().len(),
            aliases = resolver.keys().len(),
            "pipeline resolved"
        );

        Ok(Self {
            rules,
            resolver,
            assets,
        })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn resolver(&self) -> &PathAliasResolver {
        &self.resolver
    }

    /// Classifier of an asset rule, by rule index.
    pub fn asset_classifier(&self, rule: usize) -> Option<&AssetClassifier> {
        self.assets.get(&rule)
    }

    /// Rule for a file, or `NoRuleMatch`.
    pub fn match_file(&self, path: &str) -> Result<RuleMatch<'_>, FileError> {
        self.rules
            .match_rule(path)
            .ok_or_else(|| FileError::NoRuleMatch(path.to_string()))
    }

    /// Run a batch without instrumentation.
    pub fn execute(&self, files: &[SourceFile], invoker: &dyn HandlerInvoker) -> BuildOutput {
        self.run(files, invoker, &mut NoopObserver)
    }

    /// Run a batch, reporting to `observer`.
    pub fn run(
        &self,
        files: &[SourceFile],
        invoker: &dyn HandlerInvoker,
        observer: &mut dyn BuildObserver,
    ) -> BuildOutput {
        let mut output = BuildOutput::default();

        for file in files {
            let path = normalize_identifier(&file.path).into_owned();

            let matched = match self.match_file(&path) {
                Ok(m) => m,
                Err(_) => {
                    tracing::debug!(file = %path, "no rule match");
                    output.unmatched.push(path);
                    continue;
                }
            };

            let chain = matched.rule.chain_name();
            let started = observer.timing_enabled().then(Instant::now);
            let result = self.apply_chain(&matched, &path, &file.bytes, invoker);
            if let Some(started) = started {
                observer.chain_finished(&chain, started.elapsed());
            }

            match result {
                Ok(kind) => {
                    let entry = OutputEntry {
                        rule: matched.index,
                        chain,
                        output: kind,
                    };
                    observer.output_recorded(&path, &entry);
                    output.manifest.insert(path, entry);
                }
                Err(error) => {
                    tracing::warn!(file = %path, %error, "file failed");
                    output.failures.push(FileFailure { path, error });
                }
            }
        }

        output.unmatched.sort();
        output.failures.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!(
            outputs = output.manifest.len(),
            unmatched = output.unmatched.len(),
            failures = output.failures.len(),
            "build batch finished"
        );
        output
    }

    fn apply_chain(
        &self,
        matched: &RuleMatch<'_>,
        path: &str,
        bytes: &[u8],
        invoker: &dyn HandlerInvoker,
    ) -> Result<OutputKind, FileError> {
        let ctx = HandlerContext {
            source: path,
            resolver: &self.resolver,
        };
        let mut current = bytes.to_vec();

        for handler in matched.chain().application_order() {
            if handler.name == ASSET_HANDLER {
                if let Some(classifier) = self.assets.get(&matched.index) {
                    return Ok(OutputKind::Asset(classifier.classify(path, &current)));
                }
            }

            current = invoker
                .invoke(handler, &current, &ctx)
                .map_err(|message| FileError::Handler {
                    handler: handler.name.clone(),
                    message,
                })?;
        }

        Ok(OutputKind::Transformed {
            size_bytes: current.len() as u64,
            content_hash: crate::asset::content_hash(&current),
        })
    }
}
