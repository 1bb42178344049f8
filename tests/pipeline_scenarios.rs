//! End-to-end tests: layers → effective config → pipeline → build output.

use packcfg::asset::AssetMode;
use packcfg::config::{ComposeError, LayerOrigin};
use packcfg::pipeline::{collect_sources, OutputKind};
use packcfg::{
    wrap, ConfigError, ConfigLayer, DuplicatePolicy, EffectiveConfig, InstrumentSet,
    MergeStrategy, Mode, PassThrough, Pipeline, PipelineError, Resolution, RuleError, SourceFile,
};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn context(path: &str) -> ConfigLayer {
    ConfigLayer::new("cli", json!({ "context": path }))
        .unwrap()
        .with_origin(LayerOrigin::Cli)
}

#[test]
fn test_base_and_dev_css_rules_keep_declaration_order() {
    let base = ConfigLayer::new(
        "base",
        json!({
            "resolve": {"alias": {"@": "/src"}},
            "module": {"rules": [
                {"test": {"suffix": ".css"}, "use": ["style-chain"]}
            ]}
        }),
    )
    .unwrap();
    let dev = ConfigLayer::new(
        "dev",
        json!({
            "module": {"rules": [
                {"test": {"suffix": ".css"}, "use": ["dev-style-chain"]}
            ]}
        }),
    )
    .unwrap()
    .with_strategy("module.rules", MergeStrategy::Append);

    let config = EffectiveConfig::compose(&[base, dev]).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();

    assert_eq!(pipeline.rules().len(), 2);
    let m = pipeline.match_file("theme/app.css").unwrap();
    assert_eq!(m.index, 0);
    assert_eq!(m.chain().display_name(), "style-chain");
    assert_eq!(pipeline.rules().shadowed()[0].index, 1);

    assert_eq!(
        pipeline.resolver().resolve("@/main"),
        Resolution::Aliased {
            key: "@".into(),
            path: PathBuf::from("/src/main")
        }
    );
}

#[test]
fn test_explicit_replace_drops_base_rules() {
    let base = ConfigLayer::new(
        "base",
        json!({"module": {"rules": [{"test": {"suffix": ".css"}, "use": ["a"]}]}}),
    )
    .unwrap();
    let over = ConfigLayer::new(
        "over",
        json!({"module": {"rules": [{"test": {"suffix": ".css"}, "use": ["b"]}]}}),
    )
    .unwrap()
    .with_strategy("module.rules", MergeStrategy::Replace);

    let config = EffectiveConfig::compose(&[base, over]).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.rules().len(), 1);
    assert_eq!(
        pipeline.match_file("x.css").unwrap().chain().display_name(),
        "b"
    );
}

#[test]
fn test_conflicting_strategies_rejected() {
    let a = ConfigLayer::new("a", json!({"plugins": []}))
        .unwrap()
        .with_strategy("plugins", MergeStrategy::Replace);
    let b = ConfigLayer::new("b", json!({"plugins": [{"name": "extra"}]}))
        .unwrap()
        .with_strategy("plugins", MergeStrategy::Append);
    let err = EffectiveConfig::build(Mode::Development, &[a, b]).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Compose(ComposeError::MergeStrategyConflict { .. })
    ));
}

#[test]
fn test_file_layer_replaces_builtin_rules() {
    let dir = TempDir::new().unwrap();
    let layer_path = dir.path().join("repo.toml");
    fs::write(
        &layer_path,
        r#"
[[module.rules]]
name = "plain-css"
test = { suffix = ".css" }
use = ["raw"]

[layer]
name = "repo"

[layer.strategies]
"module.rules" = "replace"
"#,
    )
    .unwrap();

    let repo = ConfigLayer::from_file(&layer_path).unwrap();
    let config = EffectiveConfig::build(Mode::Production, &[context("/w"), repo]).unwrap();
    let spec = config.pipeline_spec().unwrap();
    assert_eq!(spec.module.rules.len(), 1);
    assert_eq!(spec.module.rules[0].name.as_deref(), Some("plain-css"));

    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.match_file("a.css").unwrap().chain().display_name(), "raw");
    assert!(pipeline.match_file("src/main.js").is_err());
    // other lists keep appending
    assert!(spec.plugins.iter().any(|p| p.name == "css-extract"));
    assert!(spec.plugins.iter().any(|p| p.name == "vue-loader"));
}

#[test]
fn test_duplicated_font_rule_is_construction_error() {
    let font = json!({
        "test": {"regex": r"\.(woff2?|eot|ttf|otf)$"},
        "use": [{"name": "asset", "options": {"max_inline_bytes": 10240, "filename": "static/fonts/{hash}{ext}"}}]
    });
    let repo = ConfigLayer::new("repo", json!({"module": {"rules": [font]}})).unwrap();

    let config = EffectiveConfig::build(Mode::Production, &[context("/w"), repo]).unwrap();
    let err = Pipeline::from_config(&config).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Rules(RuleError::DuplicateRule { first: 3, .. })
    ));
    if let PipelineError::Rules(rule_err) = &err {
        let code = rule_err.to_code();
        assert!(code.starts_with("DUPLICATE_RULE:"));
        assert!(code.ends_with("==3"));
    }
}

#[test]
fn test_mode_instruments_union_with_requested() {
    let production = EffectiveConfig::build(Mode::Production, &[context("/w")]).unwrap();
    assert_eq!(production.get_bool("instrument.measure_timing"), None);
    let requested = InstrumentSet::default().with("timing".parse().unwrap());
    let active = production.pipeline_spec().unwrap().instrument.union(requested);
    assert!(active.measure_timing && !active.analyze_output);

    let analysis = EffectiveConfig::build(Mode::Analysis, &[context("/w")]).unwrap();
    assert_eq!(analysis.get_bool("instrument.analyze_output"), Some(true));
    let active = analysis.pipeline_spec().unwrap().instrument.union(requested);
    assert_eq!(active, InstrumentSet::all());
}

#[test]
fn test_file_layer_overrides_image_threshold() {
    let dir = TempDir::new().unwrap();
    let layer_path = dir.path().join("small-inline.toml");
    fs::write(
        &layer_path,
        r#"
[module]
duplicates = "first-wins"

[[module.rules]]
name = "tiny-images"
test = { regex = '\.png$' }
use = [{ name = "asset", options = { max_inline_bytes = 16, filename = "img/{name}.{hash}{ext}" } }]

[layer]
name = "small-inline"
"#,
    )
    .unwrap();

    let file_layer = ConfigLayer::from_file(&layer_path).unwrap();
    let config = EffectiveConfig::build(Mode::Development, &[context("/w"), file_layer]).unwrap();
    assert_eq!(config.sources.last().unwrap().name, "small-inline");

    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.rules().policy(), DuplicatePolicy::FirstWins);
    // appended after the built-in image rule, which still wins for .png
    let m = pipeline.match_file("a.png").unwrap();
    assert_eq!(m.rule.chain_name(), "images");
    assert_eq!(pipeline.asset_classifier(m.index).unwrap().threshold(), 10240);
}

#[test]
fn test_threshold_boundary_end_to_end() {
    let config = EffectiveConfig::build(Mode::Production, &[context("/w")]).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();
    let out = pipeline.execute(
        &[
            SourceFile::new("img/below.png", vec![0u8; 10239]),
            SourceFile::new("img/at.png", vec![0u8; 10240]),
        ],
        &PassThrough,
    );

    let mode = |path: &str| match &out.manifest[path].output {
        OutputKind::Asset(d) => d.mode,
        other => panic!("expected asset, got {:?}", other),
    };
    assert_eq!(mode("img/below.png"), AssetMode::Inline);
    assert_eq!(mode("img/at.png"), AssetMode::Emitted);
}

#[test]
fn test_wrapper_does_not_change_build_output() {
    let config = EffectiveConfig::build(Mode::Analysis, &[context("/w")]).unwrap();
    let spec = config.pipeline_spec().unwrap();
    assert_eq!(spec.instrument, InstrumentSet::all());

    let files = vec![
        SourceFile::new("src/App.vue", b"<template></template>".to_vec()),
        SourceFile::new("src/main.js", b"import App from '@/App'".to_vec()),
        SourceFile::new("src/theme.less", b"@c: red;".to_vec()),
        SourceFile::new("fonts/icons.woff", vec![3u8; 30_000]),
        SourceFile::new("README.md", b"docs".to_vec()),
    ];

    let pipeline = Pipeline::from_config(&config).unwrap();
    let bare = pipeline.execute(&files, &PassThrough);
    let wrapped = wrap(config.clone(), spec.instrument);
    let outcome = wrapped.execute(&files, &PassThrough).unwrap();

    assert_eq!(outcome.output, bare);
    assert_eq!(bare.unmatched, vec!["README.md".to_string()]);

    let analysis = outcome.analysis.unwrap();
    assert_eq!(analysis.totals.emitted.count, 1);
    assert_eq!(analysis.entries.len(), 4);
    let timing = outcome.timing.unwrap();
    assert_eq!(
        timing.chains.values().map(|t| t.invocations).sum::<u64>(),
        4
    );
    assert_eq!(wrapped.config().fingerprint().unwrap(), config.fingerprint().unwrap());
}

#[test]
fn test_build_over_source_tree() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/components")).unwrap();
    fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
    fs::write(dir.path().join("src/main.js"), "new Vue()").unwrap();
    fs::write(dir.path().join("src/components/Nav.vue"), "<nav/>").unwrap();
    fs::write(dir.path().join("src/logo.png"), vec![1u8; 64]).unwrap();
    fs::write(dir.path().join("node_modules/lib/index.js"), "module.exports=1").unwrap();

    let root = dir.path().to_string_lossy().to_string();
    let config = EffectiveConfig::build(Mode::Development, &[context(&root)]).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();

    let sources = collect_sources(dir.path()).unwrap();
    let out = pipeline.execute(&sources.files, &PassThrough);

    assert_eq!(out.manifest.len(), 3);
    assert_eq!(out.unmatched, vec!["node_modules/lib/index.js".to_string()]);
    assert_eq!(out.manifest["src/components/Nav.vue"].chain, "components");

    let resolved = pipeline
        .resolver()
        .resolve_file("cmp/Nav", &packcfg::FsProbe)
        .unwrap();
    assert_eq!(resolved, dir.path().join("src/components/Nav.vue"));
}

#[test]
fn test_pipeline_shared_across_threads() {
    let config = EffectiveConfig::build(Mode::Production, &[context("/w")]).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();

    let batches: Vec<Vec<SourceFile>> = (0..4)
        .map(|i| {
            vec![
                SourceFile::new(format!("src/m{}.js", i), format!("export default {}", i)),
                SourceFile::new(format!("img/p{}.png", i), vec![i as u8; 20_000]),
            ]
        })
        .collect();

    let shared = &pipeline;
    let outputs: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = batches
            .iter()
            .map(|batch| s.spawn(move || shared.execute(batch, &PassThrough)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, out) in outputs.iter().enumerate() {
        assert_eq!(out, &pipeline.execute(&batches[i], &PassThrough));
        assert_eq!(out.manifest.len(), 2);
    }
}
