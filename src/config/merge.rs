//! Layer composition
//!
//! Merges an ordered list of layers into one object:
//! - `replace`: last declaring layer wins
//! - `append`: arrays concatenate in layer order
//! - `deep-merge`: objects merge key by key, recursively
//!
//! A field's strategy is the one explicitly declared for its dotted path by
//! any layer. Without a declaration it is inferred from the values: objects
//! deep-merge, arrays append, everything else is replaced.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::layer::{value_kind, ConfigLayer, MergeStrategy};

/// Composition errors. All are fatal before any build work starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error(
        "merge strategy conflict on '{field}': layer '{first_layer}' declares {first}, \
         layer '{second_layer}' declares {second}"
    )]
    MergeStrategyConflict {
        field: String,
        first_layer: String,
        first: MergeStrategy,
        second_layer: String,
        second: MergeStrategy,
    },

    #[error("layer '{layer}': field '{field}' uses {strategy} but holds a {found}")]
    StrategyTypeMismatch {
        layer: String,
        field: String,
        strategy: MergeStrategy,
        found: &'static str,
    },
}

/// Explicit strategies agreed across all layers, keyed by dotted path.
pub type StrategyTable = BTreeMap<String, MergeStrategy>;

/// Collect explicit strategies, failing on the first disagreement.
pub fn resolve_strategies(layers: &[ConfigLayer]) -> Result<StrategyTable, ComposeError> {
    let mut declared: BTreeMap<String, (MergeStrategy, &str)> = BTreeMap::new();

    for layer in layers {
        for (field, &strategy) in layer.strategies() {
            match declared.get(field) {
                Some(&(first, first_layer)) if first != strategy => {
                    return Err(ComposeError::MergeStrategyConflict {
                        field: field.clone(),
                        first_layer: first_layer.to_string(),
                        first,
                        second_layer: layer.name().to_string(),
                        second: strategy,
                    });
                }
                Some(_) => {}
                None => {
                    declared.insert(field.clone(), (strategy, layer.name()));
                }
            }
        }
    }

    Ok(declared
        .into_iter()
        .map(|(field, (strategy, _))| (field, strategy))
        .collect())
}

/// Compose layers in order (first is the base, last is most specific).
///
/// Pure: layers are only borrowed and the same input always yields the same
/// object.
pub fn compose(layers: &[ConfigLayer]) -> Result<Value, ComposeError> {
    let strategies = resolve_strategies(layers)?;
    let mut merged = Map::new();

    for layer in layers {
        let ctx = MergeContext {
            layer: layer.name(),
            strategies: &strategies,
        };
        merge_object(&mut merged, layer.fields(), "", &ctx)?;
    }

    Ok(Value::Object(merged))
}

struct MergeContext<'a> {
    layer: &'a str,
    strategies: &'a StrategyTable,
}

fn merge_object(
    base: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    prefix: &str,
    ctx: &MergeContext<'_>,
) -> Result<(), ComposeError> {
    for (key, overlay_value) in overlay {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let merged = merge_value(base.remove(key), overlay_value, &path, ctx)?;
        base.insert(key.clone(), merged);
    }
    Ok(())
}

fn merge_value(
    base: Option<Value>,
    overlay: &Value,
    path: &str,
    ctx: &MergeContext<'_>,
) -> Result<Value, ComposeError> {
    let explicit = ctx.strategies.get(path).copied();
    let strategy = explicit.unwrap_or_else(|| infer_strategy(base.as_ref(), overlay));

    let mismatch = |found: &Value| ComposeError::StrategyTypeMismatch {
        layer: ctx.layer.to_string(),
        field: path.to_string(),
        strategy,
        found: value_kind(found),
    };

    match strategy {
        MergeStrategy::Replace => Ok(overlay.clone()),

        MergeStrategy::Append => {
            let items = overlay.as_array().ok_or_else(|| mismatch(overlay))?;
            match base {
                None => Ok(overlay.clone()),
                Some(Value::Array(mut existing)) => {
                    existing.extend(items.iter().cloned());
                    Ok(Value::Array(existing))
                }
                Some(other) if explicit.is_some() => Err(mismatch(&other)),
                Some(_) => Ok(overlay.clone()),
            }
        }

        MergeStrategy::DeepMerge => {
            let fields = overlay.as_object().ok_or_else(|| mismatch(overlay))?;
            let mut target = match base {
                None => Map::new(),
                Some(Value::Object(existing)) => existing,
                Some(other) if explicit.is_some() => return Err(mismatch(&other)),
                Some(_) => Map::new(),
            };
            merge_object(&mut target, fields, path, ctx)?;
            Ok(Value::Object(target))
        }
    }
}

fn infer_strategy(base: Option<&Value>, overlay: &Value) -> MergeStrategy {
    match (base, overlay) {
        (None | Some(Value::Object(_)), Value::Object(_)) => MergeStrategy::DeepMerge,
        (None | Some(Value::Array(_)), Value::Array(_)) => MergeStrategy::Append,
        _ => MergeStrategy::Replace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layer(name: &str, fields: Value) -> ConfigLayer {
        ConfigLayer::new(name, fields).unwrap()
    }

    #[test]
    fn test_scalar_replace() {
        let result = compose(&[layer("a", json!({"f": "x"})), layer("b", json!({"f": "y"}))]).unwrap();
        assert_eq!(result["f"], "y");
    }

    #[test]
    fn test_array_append_by_default() {
        let result =
            compose(&[layer("a", json!({"f": [1, 2]})), layer("b", json!({"f": [3]}))]).unwrap();
        assert_eq!(result["f"], json!([1, 2, 3]));
    }

    #[test]
    fn test_explicit_replace_on_array() {
        let result = compose(&[
            layer("a", json!({"plugins": ["vue", "html"]})),
            layer("b", json!({"plugins": ["analyzer"]})).with_strategy("plugins", MergeStrategy::Replace),
        ])
        .unwrap();
        assert_eq!(result["plugins"], json!(["analyzer"]));
    }

    #[test]
    fn test_object_deep_merge() {
        let result = compose(&[
            layer("base", json!({"resolve": {"alias": {"@": "/src"}, "extensions": [".js"]}})),
            layer("dev", json!({"resolve": {"alias": {"api": "/src/api"}}})),
        ])
        .unwrap();

        assert_eq!(result["resolve"]["alias"]["@"], "/src");
        assert_eq!(result["resolve"]["alias"]["api"], "/src/api");
        assert_eq!(result["resolve"]["extensions"], json!([".js"]));
    }

    #[test]
    fn test_nested_list_appends_unless_replaced() {
        let base = layer("base", json!({"resolve": {"extensions": [".js", ".vue"]}}));
        let more = layer("more", json!({"resolve": {"extensions": [".ts"]}}));

        let appended = compose(&[base.clone(), more.clone()]).unwrap();
        assert_eq!(appended["resolve"]["extensions"], json!([".js", ".vue", ".ts"]));

        let replaced = compose(&[
            base,
            more.with_strategy("resolve.extensions", MergeStrategy::Replace),
        ])
        .unwrap();
        assert_eq!(replaced["resolve"]["extensions"], json!([".ts"]));
    }

    #[test]
    fn test_explicit_replace_on_nested_table() {
        let result = compose(&[
            layer("a", json!({"output": {"path": "dist", "clean": true}})),
            layer("b", json!({"output": {"path": "out"}})).with_strategy("output", MergeStrategy::Replace),
        ])
        .unwrap();
        assert_eq!(result["output"], json!({"path": "out"}));
    }

    #[test]
    fn test_strategy_conflict() {
        let err = compose(&[
            layer("a", json!({"rules": []})).with_strategy("rules", MergeStrategy::Append),
            layer("b", json!({})),
            layer("c", json!({"rules": []})).with_strategy("rules", MergeStrategy::Replace),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            ComposeError::MergeStrategyConflict {
                field: "rules".to_string(),
                first_layer: "a".to_string(),
                first: MergeStrategy::Append,
                second_layer: "c".to_string(),
                second: MergeStrategy::Replace,
            }
        );
    }

    #[test]
    fn test_same_strategy_twice_is_not_conflict() {
        let result = compose(&[
            layer("a", json!({"f": [1]})).with_strategy("f", MergeStrategy::Append),
            layer("b", json!({"f": [2]})).with_strategy("f", MergeStrategy::Append),
        ])
        .unwrap();
        assert_eq!(result["f"], json!([1, 2]));
    }

    #[test]
    fn test_explicit_append_over_scalar_is_mismatch() {
        let err = compose(&[
            layer("a", json!({"f": "x"})).with_strategy("f", MergeStrategy::Append),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ComposeError::StrategyTypeMismatch { ref layer, ref field, found: "string", .. }
                if layer == "a" && field == "f"
        ));
    }

    #[test]
    fn test_explicit_deep_merge_over_array_base_is_mismatch() {
        let err = compose(&[
            layer("a", json!({"f": [1]})),
            layer("b", json!({"f": {"k": 1}})).with_strategy("f", MergeStrategy::DeepMerge),
        ])
        .unwrap_err();
        assert!(matches!(err, ComposeError::StrategyTypeMismatch { found: "array", .. }));
    }

    #[test]
    fn test_inferred_type_change_replaces() {
        let result = compose(&[layer("a", json!({"f": [1]})), layer("b", json!({"f": "now"}))]).unwrap();
        assert_eq!(result["f"], "now");
    }

    #[test]
    fn test_null_overrides() {
        let result = compose(&[layer("a", json!({"v": 100})), layer("b", json!({"v": null}))]).unwrap();
        assert!(result["v"].is_null());
    }

    #[test]
    fn test_compose_does_not_mutate_layers() {
        let a = layer("a", json!({"f": [1]}));
        let b = layer("b", json!({"f": [2]}));
        let before = (a.clone(), b.clone());

        let layers = [a, b];
        let first = compose(&layers).unwrap();
        let second = compose(&layers).unwrap();

        assert_eq!(first, second);
        assert_eq!(layers[0], before.0);
        assert_eq!(layers[1], before.1);
    }

    #[test]
    fn test_not_commutative() {
        let a = layer("a", json!({"f": "x", "l": [1]}));
        let b = layer("b", json!({"f": "y", "l": [2]}));
        let ab = compose(&[a.clone(), b.clone()]).unwrap();
        let ba = compose(&[b, a]).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab["l"], json!([1, 2]));
        assert_eq!(ba["l"], json!([2, 1]));
    }

    #[test]
    fn test_empty_layer_list() {
        assert_eq!(compose(&[]).unwrap(), json!({}));
    }
}
