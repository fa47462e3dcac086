//! Schema Metrics CLI
//!
//! Analyzes a corpus of JSON Schema documents and writes a metrics report.
//!
//! Usage:
//!   schema-metrics analyze schemas/ --output report.json
//!   schema-metrics inspect schemas/person.json
//!   schema-metrics config

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use schema_metrics::config::OutputFormat;
use schema_metrics::{batch, Analyzer, AnalyzerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-metrics")]
#[command(about = "Structural metrics for JSON Schema corpora")]
struct Cli {
    /// Configuration file layered over the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze files and directories, writing a batch report
    Analyze {
        /// Schema files or directories to walk
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Report file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads (0 = one per CPU)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Analyze at most this many documents
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Never touch the network; mirrors only
        #[arg(long)]
        offline: bool,

        /// Skip the meta-schema check
        #[arg(long)]
        no_validate: bool,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Print the record of one document
    Inspect {
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let config = match AnalyzerConfig::load_from(cli.config.as_deref().and_then(|p| p.to_str())) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, config) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

/// RUST_LOG wins over the configured filter
fn init_logging(config: &AnalyzerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.output.log_filter))
        .context("Invalid log filter")?;

    match &config.output.log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run(command: Commands, mut config: AnalyzerConfig) -> anyhow::Result<()> {
    match command {
        Commands::Analyze { paths, output, workers, limit, offline, no_validate, compact } => {
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            if let Some(limit) = limit {
                config.batch.limit = limit;
            }
            if offline {
                config.fetch.enabled = false;
            }
            if no_validate {
                config.validation.enabled = false;
            }
            if compact {
                config.output.format = OutputFormat::Compact;
            }

            let analyzer = Analyzer::from_config(&config)?;
            let files = batch::discover(&paths, &config.batch)?;
            if files.is_empty() {
                anyhow::bail!("No schema documents found");
            }

            let report = batch::run(&analyzer, &files, config.worker_count())?;

            match output {
                Some(path) => {
                    report.write(&path, config.output.format)?;
                    eprintln!("📄 Report written to {}", path.display());
                }
                None => println!("{}", report.to_json(config.output.format)?),
            }

            eprintln!(
                "📊 {} documents: {} analyzed, {} failed",
                report.documents,
                report.succeeded.len(),
                report.failed.len()
            );
            for failed in &report.failed {
                eprintln!("  ❌ {} - {}", failed.filename, failed.message);
            }
            Ok(())
        }

        Commands::Inspect { file } => {
            let analyzer = Analyzer::from_config(&config)?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file.display().to_string();

            match analyzer.analyze_bytes(&filename, &bytes) {
                Ok(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(())
                }
                Err(failure) => anyhow::bail!("{} ({})", failure, failure.kind()),
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
