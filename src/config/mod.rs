//! Layered configuration
//!
//! Layers are composed in order:
//! 1. Built-in base layer
//! 2. Mode layers (development, production, analysis)
//! 3. Layer files (`--layer path.toml`, in command-line order)
//! 4. CLI overrides
//!
//! Each field combines according to its merge strategy (replace, append,
//! deep-merge); see `merge.rs`.

mod defaults;
mod effective;
mod layer;
mod merge;
mod select;
mod spec;

pub use defaults::{BuiltinDefaults, DEFAULT_INLINE_LIMIT};
pub use effective::{ConfigError, ConfigSource, EffectiveConfig};
pub use layer::{ConfigLayer, LayerOrigin, MergeStrategy, LAYER_META_KEY};
pub use merge::{compose, resolve_strategies, ComposeError, StrategyTable};
pub use select::{select_layers, Mode};
pub use spec::{ModuleSpec, PipelineSpec, ResolveSpec};
