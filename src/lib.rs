//! packcfg - build pipeline configuration resolver
//!
//! Composes layered configuration into one effective config, then resolves
//! it into a read-only pipeline: ordered file-matching rules with handler
//! chains, import aliases with extension inference, and size-based asset
//! inlining. Handler execution itself belongs to external engines.

pub mod alias;
pub mod asset;
pub mod config;
pub mod pipeline;

pub use alias::{Alias, AliasError, FileProbe, FsProbe, PathAliasResolver, Resolution};
pub use asset::{AssetClassifier, AssetDecision, AssetError, AssetMode};
pub use config::{ConfigError, ConfigLayer, EffectiveConfig, MergeStrategy, Mode};
pub use packcfg_rules::{
    DuplicatePolicy, Handler, HandlerChain, MatchExplanation, PatternSpec, RuleError, RuleSpec,
    RuleTable,
};
pub use pipeline::{
    wrap, BuildOutput, FileError, HandlerInvoker, InstrumentSet, PassThrough, Pipeline,
    PipelineError, SourceFile, WrappedConfig,
};
