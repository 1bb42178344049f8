//! Typed view of the effective config.
//!
//! Only the parts the resolver acts on are typed. `output` is passed through
//! to the build engine as-is, and `plugins` keep their options opaque.

use packcfg_rules::{DuplicatePolicy, Handler, RuleSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::effective::ConfigError;
use crate::alias::Alias;
use crate::pipeline::InstrumentSet;

/// `resolve` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveSpec {
    /// Extensions tried, in order, for extension-less specifiers.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Alias key → target.
    #[serde(default)]
    pub alias: BTreeMap<String, String>,
}

/// `module` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,

    #[serde(default)]
    pub duplicates: DuplicatePolicy,
}

/// The pipeline as the resolver sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    pub mode: Option<String>,

    /// Absolute project root; relative alias targets are joined onto it.
    #[serde(default)]
    pub context: Option<PathBuf>,

    #[serde(default)]
    pub entry: Option<String>,

    #[serde(default)]
    pub resolve: ResolveSpec,

    #[serde(default)]
    pub module: ModuleSpec,

    #[serde(default)]
    pub output: Value,

    #[serde(default)]
    pub plugins: Vec<Handler>,

    #[serde(default)]
    pub instrument: InstrumentSet,
}

impl PipelineSpec {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let spec: PipelineSpec = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Validation(format!("pipeline config: {}", e)))?;

        if let Some(context) = &spec.context {
            if !context.is_absolute() {
                return Err(ConfigError::Validation(format!(
                    "context must be an absolute path, got '{}'",
                    context.display()
                )));
            }
        }

        Ok(spec)
    }

    /// Alias table with relative targets anchored at `context`.
    ///
    /// Relative targets stay relative when there is no context; the resolver
    /// rejects them.
    pub fn alias_table(&self) -> Vec<Alias> {
        self.resolve
            .alias
            .iter()
            .map(|(key, target)| {
                let target = Path::new(target);
                let target = match &self.context {
                    Some(root) if target.is_relative() => root.join(target),
                    _ => target.to_path_buf(),
                };
                Alias::new(key.clone(), target)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EffectiveConfig, Mode};
    use serde_json::json;

    #[test]
    fn test_builtin_config_parses() {
        let config = EffectiveConfig::build(Mode::Production, &[]).unwrap();
        let spec = config.pipeline_spec().unwrap();

        assert_eq!(spec.mode.as_deref(), Some("production"));
        assert_eq!(spec.module.duplicates, DuplicatePolicy::RejectIdentical);
        // base rules first, then the mode's style rules
        let names: Vec<_> = spec
            .module
            .rules
            .iter()
            .map(|r| r.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(
            names,
            vec!["components", "scripts", "images", "fonts", "styles", "less-styles"]
        );
        assert!(spec.plugins.iter().any(|p| p.name == "css-extract"));
        assert_eq!(spec.output["filename"], "[name].[chunkhash:8].js");
    }

    #[test]
    fn test_alias_table_anchored_at_context() {
        let spec = PipelineSpec::from_value(&json!({
            "context": "/work/app",
            "resolve": {"alias": {"@": "src", "abs": "/opt/lib"}}
        }))
        .unwrap();

        let table = spec.alias_table();
        let at = table.iter().find(|a| a.key == "@").unwrap();
        assert_eq!(at.target, PathBuf::from("/work/app/src"));
        let abs = table.iter().find(|a| a.key == "abs").unwrap();
        assert_eq!(abs.target, PathBuf::from("/opt/lib"));
    }

    #[test]
    fn test_relative_context_rejected() {
        let result = PipelineSpec::from_value(&json!({"context": "app"}));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_malformed_rules_rejected() {
        let result = PipelineSpec::from_value(&json!({"module": {"rules": [{"use": ["x"]}]}}));
        assert!(result.unwrap_err().to_string().contains("pipeline config"));
    }
}
