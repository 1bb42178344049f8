//! Mode-driven layer selection
//!
//! The mode is chosen once, when the layer list is assembled. Handlers never
//! look at the mode: development inlines styles through the `style` handler,
//! production extracts them with `css-extract`, analysis is production plus
//! the bundle analyzer and both instruments.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use super::defaults::BuiltinDefaults;
use super::effective::ConfigError;
use super::layer::ConfigLayer;

/// Build mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
    Analysis,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::Analysis => "analysis",
        }
    }

    /// Handler that delivers compiled styles in this mode.
    pub fn style_handler(&self) -> &'static str {
        match self {
            Mode::Development => "style",
            Mode::Production | Mode::Analysis => "css-extract",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            "analysis" | "analyze" => Ok(Mode::Analysis),
            other => Err(format!(
                "unknown mode '{}' (expected development, production or analysis)",
                other
            )),
        }
    }
}

/// Ordered built-in layers for `mode`. Pure: reads no process state.
pub fn select_layers(mode: Mode) -> Result<Vec<ConfigLayer>, ConfigError> {
    let mut layers = vec![base_layer()?];

    match mode {
        Mode::Development => layers.push(style_layer(Mode::Development)?),
        Mode::Production => layers.push(style_layer(Mode::Production)?),
        Mode::Analysis => {
            layers.push(style_layer(Mode::Production)?);
            layers.push(analysis_layer()?);
        }
    }

    Ok(layers)
}

/// Declares no strategies, so later layers may mark any list `replace`.
fn base_layer() -> Result<ConfigLayer, ConfigError> {
    ConfigLayer::new("base", BuiltinDefaults::default().to_value())
}

/// Style rules with the mode's delivery handler in front.
fn style_layer(mode: Mode) -> Result<ConfigLayer, ConfigError> {
    let delivery = mode.style_handler();

    let mut fields = json!({
        "mode": mode.as_str(),
        "module": {
            "rules": [
                {
                    "name": "styles",
                    "test": {"regex": r"\.css$"},
                    "use": [delivery, "css", "postcss"]
                },
                {
                    "name": "less-styles",
                    "test": {"regex": r"\.less$"},
                    "use": [delivery, "css", "postcss", "less"]
                }
            ]
        }
    });

    if mode == Mode::Production {
        fields["plugins"] = json!([
            {"name": "css-extract", "options": {"filename": "[name]_[chunkhash:8].css"}}
        ]);
    }

    Ok(ConfigLayer::new(mode.as_str(), fields)?)
}

fn analysis_layer() -> Result<ConfigLayer, ConfigError> {
    ConfigLayer::new(
        "analysis",
        json!({
            "plugins": [{"name": "bundle-analyzer"}],
            "instrument": {"measure_timing": true, "analyze_output": true}
        }),
    )
}
