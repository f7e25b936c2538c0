//! QR Intent CLI - JSON bridge interface
//!
//! Commands: manifest, translate, check, validate, process
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 success, 1 bad input, 2 safety errors remain

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use qrintent_core::{
    report::codes, CapabilityManifest, IntentProcessor, IntentRequest, ManifestRegistry,
    ProcessError, ProcessorOptions,
};

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "qrintent-cli")]
#[command(about = "QR Intent CLI - styling intents to safety-validated SVG")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Capability manifest file, or a directory of manifests
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Apply every degradation fallback, not only critical ones
    #[arg(long, global = true)]
    safe_mode: bool,

    /// Minimum foreground/background contrast ratio
    #[arg(long, global = true, default_value_t = 4.5)]
    min_contrast: f64,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(clap::Args)]
struct RequestArgs {
    /// JSON request ({"payload": {...}, "intents": {...}})
    #[arg(short, long, conflicts_with = "file")]
    request: Option<String>,

    /// Read the JSON request from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the active capability manifest
    Manifest,

    /// Translate intents and print the translation report
    Translate {
        #[command(flatten)]
        input: RequestArgs,
    },

    /// Dry run: report what degradation would change, apply nothing
    Check {
        #[command(flatten)]
        input: RequestArgs,
    },

    /// Safety report for the configuration that would be rendered
    Validate {
        #[command(flatten)]
        input: RequestArgs,
    },

    /// Full pipeline, prints the rendering result
    Process {
        #[command(flatten)]
        input: RequestArgs,

        /// Also write the SVG to this file
        #[arg(long)]
        svg_out: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    match format {
        LogFormat::Json => tracing_subscriber::registry().with(filter).with(fmt_layer.json()).init(),
        LogFormat::Text => tracing_subscriber::registry().with(filter).with(fmt_layer).init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    println!("{}", serde_json::json!({"success": false, "error": message.to_string()}));
    ExitCode::FAILURE
}

fn load_manifest(path: Option<&Path>) -> Result<CapabilityManifest, String> {
    let Some(path) = path else {
        return Ok(CapabilityManifest::builtin());
    };
    if path.is_dir() {
        let registry = ManifestRegistry::load_from_dir(path)
            .map_err(|e| format!("Failed to load manifests: {e}"))?;
        return registry.newest().cloned().map_err(|e| e.to_string());
    }
    CapabilityManifest::from_file(path).map_err(|e| format!("Failed to load manifest: {e}"))
}

fn read_request(input: &RequestArgs) -> Result<IntentRequest, String> {
    let raw = match (&input.request, &input.file) {
        (Some(json), _) => json.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        (None, None) => return Err("Provide --request or --file".to_string()),
    };
    IntentRequest::from_json(&raw).map_err(|e| format!("Invalid request: {e}"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let manifest = match load_manifest(cli.manifest.as_deref()) {
        Ok(m) => m,
        Err(e) => return fail(e),
    };

    let options = ProcessorOptions {
        safe_mode: cli.safe_mode,
        min_contrast: cli.min_contrast,
        ..ProcessorOptions::default()
    };
    let processor = IntentProcessor::new(Arc::new(manifest), options);

    let outcome = match cli.command {
        Commands::Manifest => print_json(processor.manifest()).map(|_| ExitCode::SUCCESS),

        Commands::Translate { input } => match read_request(&input) {
            Ok(request) => {
                let out = processor.translate(&request);
                print_json(&serde_json::json!({
                    "success": true,
                    "kwargs": out.kwargs,
                    "policy": out.policy,
                    "encoding": out.encoding,
                    "steps": out.steps,
                    "warnings": out.warnings,
                    "compatibility": out.compatibility,
                    "appliedHints": out.applied_hints,
                }))
                .map(|_| ExitCode::SUCCESS)
            }
            Err(e) => return fail(e),
        },

        Commands::Check { input } => match read_request(&input) {
            Ok(request) => print_json(&processor.preview(&request)).map(|_| ExitCode::SUCCESS),
            Err(e) => return fail(e),
        },

        Commands::Validate { input } => {
            let request = match read_request(&input) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };
            match processor.validate(&request) {
                Ok(report) => print_json(&report).map(|_| {
                    if report.valid {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }),
                Err(e) => return fail(e),
            }
        }

        Commands::Process { input, svg_out } => {
            let request = match read_request(&input) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };
            match processor.process(&request) {
                Ok(result) => {
                    if let Some(path) = &svg_out {
                        if let Err(e) = std::fs::write(path, &result.svg) {
                            return fail(format!("Failed to write {}: {e}", path.display()));
                        }
                    }
                    let unresolved = !result.warnings_with_code(codes::SAFETY_ERROR).is_empty();
                    print_json(&serde_json::json!({"success": true, "result": result})).map(|_| {
                        if unresolved {
                            ExitCode::from(2)
                        } else {
                            ExitCode::SUCCESS
                        }
                    })
                }
                Err(e @ ProcessError::Payload(_)) => return fail(e),
                Err(e) => {
                    tracing::error!(error = %e, "processing failed");
                    println!("{}", serde_json::json!({"success": false, "error": e.to_string()}));
                    return ExitCode::from(2);
                }
            }
        }
    };

    outcome.unwrap_or_else(|e| fail(e))
}
