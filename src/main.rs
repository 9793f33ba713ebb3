use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use soil_analyzer::analysis::Analyzer;
use soil_analyzer::config::Config;
use soil_analyzer::interface::{analyze_file, Response};
use soil_analyzer::labels::Attribute;
use soil_analyzer::registry::{ModelRegistry, ModelSlot, PRIMARY_MODEL_NAME};

#[cfg(debug_assertions)]
const LOG_LEVEL: &str = "debug";
#[cfg(not(debug_assertions))]
const LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(name = "soil-analyzer", version, about = "Classify soil photographs and suggest soil management practices")]
struct Cli {
    /// Config file (TOML). Defaults to the per-user config, then built-in defaults.
    #[arg(short, long, env = "SOIL_ANALYZER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the ONNX models, overriding the config.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Log at debug level regardless of build profile.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze images and print one JSON result per input.
    /// With no images and no --stdin, reports a missing upload.
    Analyze {
        /// Image files to analyze.
        images: Vec<PathBuf>,

        /// Read a single image from standard input instead.
        #[arg(long, conflicts_with = "images")]
        stdin: bool,

        /// Minimum soil-type confidence, overriding the config.
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Load the models and report which ones are available.
    Models,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LOG_LEVEL))
    };

    // Also installs the bridge that forwards `log` records from the library.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(models_dir) = cli.models_dir {
        config.set_models_dir(models_dir);
    }

    match cli.command {
        Command::Analyze { images, stdin, threshold } => {
            if let Some(threshold) = threshold {
                config.confidence_threshold = threshold;
            }
            config.validate()?;
            analyze(&config, &images, stdin)
        }
        Command::Models => {
            config.validate()?;
            models(&config)
        }
    }
}

/// Builds the registry once, failing before any input is read if the primary model is unusable.
fn load_registry(config: &Config) -> anyhow::Result<ModelRegistry> {
    ModelRegistry::load(config).map_err(|e| {
        error!("Model registry could not be built: {}", e);
        e.into()
    })
}

fn analyze(config: &Config, images: &[PathBuf], stdin: bool) -> anyhow::Result<ExitCode> {
    let registry = load_registry(config)?;
    let analyzer = Analyzer::new(Arc::new(registry), config.analysis_settings());

    let mut failures = 0;

    if stdin || images.is_empty() {
        let payload = if stdin {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            Some(bytes)
        } else {
            None
        };
        let response = Response::from(analyzer.analyze_upload(payload.as_deref()));
        if !response.is_success() {
            failures += 1;
        }
        print_response("-", &response)?;
    } else {
        for path in images {
            let response = analyze_file(&analyzer, path);
            if !response.is_success() {
                failures += 1;
            }
            print_response(&path.display().to_string(), &response)?;
        }
    }

    info!("Analyzed {} input(s), {} failed", images.len().max(1), failures);

    Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_response(input: &str, response: &Response) -> anyhow::Result<()> {
    let line = json!({
        "input": input,
        "status": response.status(),
        "body": response.body()?,
    });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}

fn models(config: &Config) -> anyhow::Result<ExitCode> {
    let registry = load_registry(config)?;

    let mut models = vec![json!({
        "model": PRIMARY_MODEL_NAME,
        "path": config.primary_model_path(),
        "available": true,
        "labels": registry.primary_labels(),
    })];

    for attribute in Attribute::ALL {
        let entry = match registry.attribute(attribute) {
            ModelSlot::Available { labels, .. } => json!({
                "model": attribute,
                "path": config.attribute_model_path(attribute),
                "available": true,
                "labels": labels,
            }),
            ModelSlot::Unavailable { reason } => json!({
                "model": attribute,
                "path": config.attribute_model_path(attribute),
                "available": false,
                "reason": reason,
            }),
        };
        models.push(entry);
    }

    println!("{}", serde_json::to_string_pretty(&models)?);
    Ok(ExitCode::SUCCESS)
}
