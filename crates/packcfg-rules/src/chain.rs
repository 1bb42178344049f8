//! Handler chains.
//!
//! A chain is declared outermost-first and applied last-to-first: for
//! `[style, css, postcss]` the source goes through `postcss`, then `css`,
//! then `style`. Every chain in a table follows this order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named transformation step with its own options bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "HandlerRepr")]
pub struct Handler {
    /// Handler name, resolved by the external engine.
    pub name: String,

    /// Opaque options, passed through unmodified.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HandlerRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        options: Value,
    },
}

impl From<HandlerRepr> for Handler {
    fn from(repr: HandlerRepr) -> Self {
        match repr {
            HandlerRepr::Name(name) => Handler::named(name),
            HandlerRepr::Full { name, options } => Handler { name, options },
        }
    }
}

impl Handler {
    /// Handler without options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
        }
    }

    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// Ordered handler sequence, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerChain(Vec<Handler>);

impl HandlerChain {
    pub fn new(handlers: Vec<Handler>) -> Self {
        Self(handlers)
    }

    /// Chain of option-less handlers, declaration order.
    pub fn of(names: &[&str]) -> Self {
        Self(names.iter().map(|n| Handler::named(*n)).collect())
    }

    /// Handlers as declared.
    pub fn handlers(&self) -> &[Handler] {
        &self.0
    }

    /// Handlers in the order they are applied to a source.
    pub fn application_order(&self) -> impl Iterator<Item = &Handler> {
        self.0.iter().rev()
    }

    /// Handler names joined with `!`, declaration order.
    pub fn display_name(&self) -> String {
        self.0
            .iter()
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join("!")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_application_order_is_reversed() {
        let chain = HandlerChain::of(&["style", "css", "postcss"]);
        let applied: Vec<_> = chain.application_order().map(|h| h.name.as_str()).collect();
        assert_eq!(applied, vec!["postcss", "css", "style"]);
    }

    #[test]
    fn test_display_name() {
        let chain = HandlerChain::of(&["style", "css"]);
        assert_eq!(chain.display_name(), "style!css");
    }

    #[test]
    fn test_deserialize_mixed_handlers() {
        let chain: HandlerChain = serde_json::from_value(json!([
            "thread",
            {"name": "babel", "options": {"presets": ["@babel/preset-env"]}}
        ]))
        .unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.handlers()[0], Handler::named("thread"));
        assert_eq!(chain.handlers()[1].options["presets"][0], "@babel/preset-env");
    }

    #[test]
    fn test_options_pass_through_unchanged() {
        let options = json!({"nested": {"k": [1, 2, 3]}, "flag": true});
        let handler = Handler::with_options("custom", options.clone());
        let round: Handler =
            serde_json::from_str(&serde_json::to_string(&handler).unwrap()).unwrap();
        assert_eq!(round.options, options);
    }
}
