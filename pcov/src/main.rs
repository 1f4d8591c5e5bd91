//! One-shot pipeline coverage CLI.
#![forbid(unsafe_code)]

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use pcov::{CoverageEngine, ManifestConfig, ManifestLoader, Reconcile, TracingSink};
use pcov_common::{
    CoverageSettings, LogConfig, PipelineCoverage, generate_coverage_schema, init_logging,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "pcov", about = "Pipeline test coverage from CI manifests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the manifests once and print the coverage record
    Reconcile {
        #[command(flatten)]
        manifests: ManifestArgs,

        /// Output format
        #[arg(long, default_value = "json")]
        format: OutputFormat,

        /// Exit non-zero when the reconciliation failed
        #[arg(long)]
        strict: bool,
    },
    /// Print the test case sets extracted from the manifests
    Load {
        #[command(flatten)]
        manifests: ManifestArgs,
    },
    /// Print the JSON Schema of the coverage record
    Schema,
}

#[derive(clap::Args)]
struct ManifestArgs {
    /// Manifest directory (defaults to PCOV_MANIFEST_DIR)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Desired manifest file name
    #[arg(long)]
    desired_file: Option<String>,

    /// Actual manifest file name
    #[arg(long)]
    actual_file: Option<String>,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Json,
    Pretty,
    Summary,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (settings, env_errors) = CoverageSettings::from_env();

    let mut log_config = LogConfig::from_settings(&settings).with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    for error in &env_errors {
        warn!(%error, "Ignoring invalid environment value");
    }

    match cli.command {
        Commands::Reconcile {
            manifests,
            format,
            strict,
        } => {
            let engine = CoverageEngine::new(
                manifest_config(settings.clone(), manifests),
                Arc::new(TracingSink),
            );
            let reconciliation = engine.reconcile();
            let record = reconciliation.record(&settings.identity);

            let output = match format {
                OutputFormat::Json => record.to_json()?,
                OutputFormat::Pretty => record.to_json_pretty()?,
                OutputFormat::Summary => summary(&record),
            };
            println!("{}", output);

            if strict && reconciliation.is_failed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Load { manifests } => {
            let config = manifest_config(settings, manifests);
            let sets = ManifestLoader::new(&config, &TracingSink).load()?;
            println!("{}", serde_json::to_string_pretty(&sets)?);
        }
        Commands::Schema => {
            let schema = generate_coverage_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn manifest_config(mut settings: CoverageSettings, args: ManifestArgs) -> ManifestConfig {
    settings.manifest_dir = settings.manifest_dir.override_with(args.dir);
    settings.desired_file = settings.desired_file.override_with(args.desired_file);
    settings.actual_file = settings.actual_file.override_with(args.actual_file);
    ManifestConfig::from_settings(&settings)
}

fn summary(record: &PipelineCoverage) -> String {
    let result = &record.result;
    let mut lines = vec![
        format!("phase:    {}", result.phase),
        format!("coverage: {}", result.coverage),
        format!(
            "tests:    {} desired, {} valid, {} invalid",
            record.spec.test.count, result.valid_test_count, result.invalid_test_count
        ),
    ];
    if !result.reason.is_empty() {
        lines.push(format!("reason:   {}", result.reason));
    }
    if !result.warning.is_empty() {
        lines.push(format!("warning:  {}", result.warning));
    }
    if !result.deprecated.is_empty() {
        lines.push(format!("deprecated: {}", result.deprecated));
    }
    lines.join("\n")
}
