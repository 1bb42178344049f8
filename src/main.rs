//! packcfg CLI
//!
//! Entry point for the `packcfg` command-line tool.

use clap::{Args, Parser, Subcommand};
use packcfg::config::LayerOrigin;
use packcfg::pipeline::{collect_sources, AnalysisReport, Instrument, OutputKind, TimingReport};
use packcfg::{
    wrap, ConfigLayer, EffectiveConfig, FsProbe, InstrumentSet, Mode, PassThrough, Pipeline,
    PipelineError, Resolution,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "packcfg")]
#[command(about = "Build pipeline configuration resolver", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Build mode (development, production, analysis)
    #[arg(long, short = 'm', global = true, env = "PACKCFG_MODE", default_value = "development")]
    mode: Mode,

    /// Extra TOML layer, applied after the built-in layers (repeatable)
    #[arg(long = "layer", short = 'l', global = true)]
    layers: Vec<PathBuf>,

    /// Project root that relative alias targets are anchored at
    /// (default: current directory)
    #[arg(long, global = true)]
    context: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Errors only
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as JSON
    Resolve {
        /// Write to this file instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Print only the config fingerprint
        #[arg(long)]
        fingerprint: bool,
    },

    /// Explain which rule handles a file
    Match {
        /// Path of the file, relative to the source root
        path: String,

        /// Output in human-readable format instead of JSON
        #[arg(long)]
        human: bool,
    },

    /// Resolve an import specifier through the alias table
    Alias {
        specifier: String,

        /// Infer the extension against the filesystem
        #[arg(long)]
        probe: bool,
    },

    /// Classify a file with its rule's asset settings
    Classify {
        file: PathBuf,

        /// Path used for rule matching (default: FILE as given)
        #[arg(long = "as")]
        match_as: Option<String>,
    },

    /// Compose and construct everything, reporting the first error
    Verify,

    /// Run the pipeline over a source tree with pass-through handlers
    Build {
        /// Source root
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Output directory for manifest.json and reports
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Extra instruments (timing, analyze), comma-separated
        #[arg(long, value_delimiter = ',')]
        instrument: Vec<Instrument>,

        /// Exit 1 when any file is unmatched or failed
        #[arg(long)]
        strict: bool,

        /// Print a human-readable summary instead of the manifest
        #[arg(long)]
        human: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.global.verbose, cli.global.quiet);

    match cli.command {
        Commands::Resolve { out, fingerprint } => run_resolve(&cli.global, out, fingerprint),
        Commands::Match { path, human } => run_match(&cli.global, &path, human),
        Commands::Alias { specifier, probe } => run_alias(&cli.global, &specifier, probe),
        Commands::Classify { file, match_as } => run_classify(&cli.global, &file, match_as),
        Commands::Verify => run_verify(&cli.global),
        Commands::Build {
            root,
            out,
            instrument,
            strict,
            human,
        } => run_build(&cli.global, &root, out, &instrument, strict, human),
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

/// Built-in layers, the cwd context, file layers, then `--context`.
fn load_config(global: &GlobalArgs) -> EffectiveConfig {
    let mut extra = Vec::new();

    match std::env::current_dir() {
        Ok(cwd) => extra.push(context_layer("cwd", &cwd, LayerOrigin::Builtin)),
        Err(e) => {
            eprintln!("Error reading current directory: {}", e);
            process::exit(1);
        }
    }

    for path in &global.layers {
        match ConfigLayer::from_file(path) {
            Ok(layer) => extra.push(layer),
            Err(e) => {
                eprintln!("Error loading layer {}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    if let Some(context) = &global.context {
        let context = match fs::canonicalize(context) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error resolving context {}: {}", context.display(), e);
                process::exit(1);
            }
        };
        extra.push(context_layer("cli", &context, LayerOrigin::Cli));
    }

    match EffectiveConfig::build(global.mode, &extra) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn context_layer(name: &str, context: &Path, origin: LayerOrigin) -> ConfigLayer {
    let fields = serde_json::json!({ "context": context.to_string_lossy() });
    match ConfigLayer::new(name, fields) {
        Ok(layer) => layer.with_origin(origin),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn load_pipeline(config: &EffectiveConfig) -> Pipeline {
    match Pipeline::from_config(config) {
        Ok(pipeline) => pipeline,
        Err(PipelineError::Rules(e)) => {
            eprintln!("Pipeline error [{}]: {}", e.to_code(), e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Pipeline error: {}", e);
            process::exit(1);
        }
    }
}

fn print_json(result: Result<String, serde_json::Error>) {
    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_resolve(global: &GlobalArgs, out: Option<PathBuf>, fingerprint: bool) {
    let config = load_config(global);

    if fingerprint {
        match config.fingerprint() {
            Ok(fp) => println!("{}", fp),
            Err(e) => {
                eprintln!("Error computing fingerprint: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    match out {
        Some(path) => {
            if let Err(e) = config.write_to_file(&path) {
                eprintln!("Error writing {}: {}", path.display(), e);
                process::exit(1);
            }
            println!("Wrote {}", path.display());
        }
        None => print_json(config.to_json()),
    }
}

fn run_match(global: &GlobalArgs, path: &str, human: bool) {
    let config = load_config(global);
    let pipeline = load_pipeline(&config);
    let explanation = pipeline.rules().explain(path);

    if human {
        println!("{}", explanation.to_human());
    } else {
        print_json(explanation.to_json());
    }

    if explanation.selected.is_none() {
        process::exit(1);
    }
}

fn run_alias(global: &GlobalArgs, specifier: &str, probe: bool) {
    let config = load_config(global);
    let pipeline = load_pipeline(&config);
    let resolver = pipeline.resolver();

    if probe {
        match resolver.resolve_file(specifier, &FsProbe) {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
        return;
    }

    match resolver.resolve(specifier) {
        Resolution::Aliased { key, path } => println!("{} (via '{}')", path.display(), key),
        Resolution::Unaliased(s) => println!("{} (no alias)", s),
    }
}

fn run_classify(global: &GlobalArgs, file: &Path, match_as: Option<String>) {
    let config = load_config(global);
    let pipeline = load_pipeline(&config);

    let identifier = match_as.unwrap_or_else(|| file.to_string_lossy().to_string());
    let matched = match pipeline.match_file(&identifier) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let Some(classifier) = pipeline.asset_classifier(matched.index) else {
        eprintln!(
            "Rule #{} ({}) is not an asset rule",
            matched.index,
            matched.rule.chain_name()
        );
        process::exit(1);
    };

    let bytes = match fs::read(file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", file.display(), e);
            process::exit(1);
        }
    };

    let decision = classifier.classify(&identifier, &bytes);
    print_json(serde_json::to_string_pretty(&decision));
}

fn run_verify(global: &GlobalArgs) {
    let config = load_config(global);
    let pipeline = load_pipeline(&config);
    let spec = match config.pipeline_spec() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    println!("Configuration valid ({})", global.mode);
    println!();
    println!(
        "  Layers: {}",
        config
            .sources
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    );
    println!("  Rules: {}", pipeline.rules().len());
    for rule in pipeline.rules().rules() {
        println!(
            "    #{} {:<12} {}",
            rule.index,
            rule.chain_name(),
            rule.chain().display_name()
        );
    }
    for shadowed in pipeline.rules().shadowed() {
        println!(
            "  Warning: rule #{} is shadowed by rule #{}",
            shadowed.index, shadowed.shadowed_by
        );
    }
    println!("  Aliases: {}", pipeline.resolver().keys().join(", "));
    println!("  Extensions: {}", pipeline.resolver().extensions().join(", "));
    if !spec.plugins.is_empty() {
        println!(
            "  Plugins: {}",
            spec.plugins
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if let Some(public_path) = config.get_str("output.public_path") {
        println!("  Public path: {}", public_path);
    }
    let active: Vec<&str> = [
        ("timing", "instrument.measure_timing"),
        ("analyze", "instrument.analyze_output"),
    ]
    .into_iter()
    .filter(|(_, path)| config.get_bool(path).unwrap_or(false))
    .map(|(name, _)| name)
    .collect();
    if !active.is_empty() {
        println!("  Instruments: {}", active.join(", "));
    }
    if let Ok(fp) = config.fingerprint() {
        println!("  Fingerprint: {}", fp);
    }
}

fn run_build(
    global: &GlobalArgs,
    root: &Path,
    out: Option<PathBuf>,
    extra_instruments: &[Instrument],
    strict: bool,
    human: bool,
) {
    let config = load_config(global);
    let pipeline = load_pipeline(&config);
    let spec = match config.pipeline_spec() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let requested = extra_instruments
        .iter()
        .fold(InstrumentSet::default(), |set, i| set.with(*i));
    let instruments = spec.instrument.union(requested);

    let sources = match collect_sources(root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading sources: {}", e);
            process::exit(1);
        }
    };

    let wrapped = wrap(config, instruments);
    let mut outcome = wrapped.execute_with(&pipeline, &sources.files, &PassThrough);
    outcome.output.failures.extend(sources.unreadable);
    outcome.output.failures.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(dir) = &out {
        let written = write_outputs(
            dir,
            wrapped.config(),
            &outcome.output,
            &outcome.timing,
            &outcome.analysis,
        );
        if let Err(e) = written {
            eprintln!("Error writing outputs to {}: {}", dir.display(), e);
            process::exit(1);
        }
    }

    if human {
        print_summary(&outcome.output);
        if let Some(timing) = &outcome.timing {
            println!();
            println!("{}", timing.to_human());
        }
        if let Some(analysis) = &outcome.analysis {
            println!();
            println!("{}", analysis.to_human());
        }
    } else if out.is_none() {
        print_json(outcome.output.to_json());
    }

    if strict && !outcome.output.is_clean() {
        process::exit(1);
    }
}

fn write_outputs(
    dir: &Path,
    config: &EffectiveConfig,
    output: &packcfg::BuildOutput,
    timing: &Option<TimingReport>,
    analysis: &Option<AnalysisReport>,
) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;

    config
        .write_to_file(&dir.join("effective_config.json"))
        .map_err(|e| e.to_string())?;

    let write = |name: &str, json: Result<String, serde_json::Error>| -> Result<(), String> {
        let json = json.map_err(|e| e.to_string())?;
        fs::write(dir.join(name), json).map_err(|e| format!("{}: {}", name, e))
    };

    write("manifest.json", output.to_json())?;
    if let Some(timing) = timing {
        write("timing.json", timing.to_json())?;
    }
    if let Some(analysis) = analysis {
        write("analysis.json", analysis.to_json())?;
    }
    Ok(())
}

fn print_summary(output: &packcfg::BuildOutput) {
    let inline = output
        .manifest
        .values()
        .filter(|e| matches!(&e.output, OutputKind::Asset(d) if d.is_inline()))
        .count();
    let emitted = output
        .manifest
        .values()
        .filter(|e| matches!(&e.output, OutputKind::Asset(d) if !d.is_inline()))
        .count();

    println!(
        "Build: {} output(s) ({} inline, {} emitted), {} unmatched, {} failed",
        output.manifest.len(),
        inline,
        emitted,
        output.unmatched.len(),
        output.failures.len()
    );
    for path in &output.unmatched {
        println!("  unmatched: {}", path);
    }
    for failure in &output.failures {
        println!("  failed: {}: {}", failure.path, failure.error);
    }
}
