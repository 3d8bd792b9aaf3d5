//! Command-line front end for the collection engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use collector::sinks::{build_sink, target_for};
use collector::{
    global_registry, Pipeline, RecordSink, RunStatus, ScrapeConfig, ScrapeOutcome, SinkConfig,
};

const TEMPLATE: &str = include_str!("template.yaml");

#[derive(Parser)]
#[command(
    name = "scraper",
    about = "Declarative market data collection",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scrape config and persist its records
    Run {
        /// Path to a YAML scrape config
        config: PathBuf,

        /// Append records to this JSONL file, overriding the config's sink
        #[arg(long)]
        output: Option<PathBuf>,

        /// Collect records but persist nothing
        #[arg(long)]
        dry_run: bool,

        /// Abort the run after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Check a config without fetching anything
    Validate {
        /// Path to a YAML scrape config
        config: PathBuf,
    },

    /// List available field processors
    Processors,

    /// Print a starter config to stdout
    Template,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            output,
            dry_run,
            deadline_secs,
        } => run(&config, output, dry_run, deadline_secs).await,
        Commands::Validate { config } => validate(&config),
        Commands::Processors => {
            for name in global_registry().names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Template => {
            print!("{TEMPLATE}");
            Ok(())
        }
    }
}

async fn run(
    config_path: &Path,
    output: Option<PathBuf>,
    dry_run: bool,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let config = load_config(config_path)?;

    let mut pipeline = Pipeline::new();
    if let Some(secs) = deadline_secs {
        pipeline = pipeline.with_run_deadline(Duration::from_secs(secs));
    }
    #[cfg(feature = "browser")]
    if config.fetcher.kind.requires_driver() {
        pipeline = pipeline.with_driver_factory(collector::CdpDriver::factory());
    }

    let outcome = pipeline.run(&config).await?;
    print_summary(&outcome);

    if dry_run {
        println!("{}", "dry run, nothing persisted".yellow());
    } else if let Some(sink_config) = sink_for(&config, output) {
        let sink = build_sink(&sink_config)
            .await
            .context("failed to build sink")?;
        let persisted = sink
            .persist(&outcome.records, &target_for(&sink_config))
            .await
            .context("failed to persist records")?;
        println!(
            "{} {} written, {} skipped ({})",
            "persisted:".bold(),
            persisted.written,
            persisted.skipped,
            sink.name()
        );
    }

    if outcome.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

/// `--output` wins over the config's sink block.
fn sink_for(config: &ScrapeConfig, output: Option<PathBuf>) -> Option<SinkConfig> {
    match output {
        Some(path) => Some(SinkConfig::Jsonl {
            path: path.display().to_string(),
            bookmaker: config.meta.name.clone(),
            category: String::new(),
        }),
        None => config.sink.clone(),
    }
}

fn validate(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let report = config.validate(global_registry());

    if report.is_ok() {
        println!("{} {}", "valid:".green().bold(), config.meta.name);
        if config.meta.allowed_domains.is_empty() {
            println!(
                "{} allowed_domains is empty, every domain is permitted",
                "note:".yellow()
            );
        }
        return Ok(());
    }

    println!(
        "{} {} problem(s) in {}",
        "invalid:".red().bold(),
        report.violations.len(),
        config_path.display()
    );
    for violation in &report.violations {
        println!("  {} {}", violation.path.cyan(), violation.message);
    }
    std::process::exit(1);
}

fn load_config(path: &Path) -> Result<ScrapeConfig> {
    ScrapeConfig::from_path(path)
        .with_context(|| format!("failed to load config: {}", path.display()))
}

fn print_summary(outcome: &ScrapeOutcome) {
    let status = match outcome.status {
        RunStatus::Completed => "completed".green().bold(),
        RunStatus::Partial => "partial".yellow().bold(),
        RunStatus::Failed => "failed".red().bold(),
    };
    println!(
        "{} {}: {} record(s), {} failure(s), {}ms",
        status,
        outcome.config_name,
        outcome.record_count(),
        outcome.failures.len(),
        outcome.duration_ms()
    );

    for failure in &outcome.failures {
        println!(
            "  {} [{:?}] {}",
            failure.at.cyan(),
            failure.kind,
            failure.message
        );
    }
}
