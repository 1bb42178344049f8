//! Built-in base layer
//!
//! Hardcoded defaults for a component-based web app: extension inference,
//! source aliases, rules for components, scripts, images and fonts, output
//! naming and the plugin list. Style rules differ by mode and live in
//! `select.rs`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default inline threshold for images and fonts (10 KiB).
pub const DEFAULT_INLINE_LIMIT: u64 = 10 * 1024;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Extensions tried, in order, for extension-less specifiers
    pub extensions: Vec<String>,

    /// Alias key → target, relative to `context` when not absolute
    pub aliases: Vec<(String, String)>,

    /// Entry module
    pub entry: String,

    /// Output directory
    pub output_path: String,

    /// Entry chunk naming template (passed through to the engine)
    pub output_filename: String,

    /// Non-entry chunk naming template
    pub chunk_filename: String,

    /// Public URL prefix of emitted files
    pub public_path: String,

    /// Inline threshold for images
    pub image_inline_limit: u64,

    /// Output template for emitted images
    pub image_filename: String,

    /// Inline threshold for fonts
    pub font_inline_limit: u64,

    /// Output template for emitted fonts
    pub font_filename: String,

    /// Page title for the HTML plugin
    pub html_title: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            extensions: vec![".js".into(), ".vue".into(), ".css".into(), ".less".into()],
            aliases: vec![
                ("@".into(), "src".into()),
                ("cmp".into(), "src/components".into()),
                ("api".into(), "src/api".into()),
            ],
            entry: "src/main.js".to_string(),
            output_path: "dist".to_string(),
            output_filename: "[name].[chunkhash:8].js".to_string(),
            chunk_filename: "[name].js".to_string(),
            public_path: "/".to_string(),
            image_inline_limit: DEFAULT_INLINE_LIMIT,
            image_filename: "static/images/{hash}{ext}".to_string(),
            font_inline_limit: DEFAULT_INLINE_LIMIT,
            font_filename: "static/fonts/{hash}{ext}".to_string(),
            html_title: "Vue3 + webpack -> Web App".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for composing
    pub fn to_value(&self) -> Value {
        let alias: serde_json::Map<String, Value> = self
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        json!({
            "entry": self.entry,
            "resolve": {
                "extensions": self.extensions,
                "alias": alias
            },
            "output": {
                "path": self.output_path,
                "filename": self.output_filename,
                "chunk_filename": self.chunk_filename,
                "public_path": self.public_path,
                "async_chunks": true,
                "clean": true
            },
            "module": {
                "duplicates": "reject-identical",
                "rules": [
                    {
                        "name": "components",
                        "test": {"regex": r"\.vue$"},
                        "use": ["vue"]
                    },
                    {
                        "name": "scripts",
                        "test": {"regex": r"\.js$"},
                        "exclude": {"regex": "node_modules"},
                        "use": [
                            "thread",
                            {"name": "babel", "options": {"presets": ["@babel/preset-env"]}}
                        ]
                    },
                    {
                        "name": "images",
                        "test": {"regex": r"\.(png|jpe?g|gif|webp|avif)(\?.*)?$"},
                        "use": [{
                            "name": "asset",
                            "options": {
                                "max_inline_bytes": self.image_inline_limit,
                                "filename": self.image_filename
                            }
                        }]
                    },
                    {
                        "name": "fonts",
                        "test": {"regex": r"\.(woff2?|eot|ttf|otf)$"},
                        "use": [{
                            "name": "asset",
                            "options": {
                                "max_inline_bytes": self.font_inline_limit,
                                "filename": self.font_filename
                            }
                        }]
                    }
                ]
            },
            "plugins": [
                {"name": "vue-loader"},
                {
                    "name": "html",
                    "options": {
                        "template": "./index.html",
                        "filename": "./index.html",
                        "title": self.html_title,
                        "minify": {"collapse_whitespace": true, "remove_comments": true}
                    }
                },
                {
                    "name": "progress-bar",
                    "options": {"color": "#85d", "basic": false, "profile": false}
                }
            ]
        })
    }
}
