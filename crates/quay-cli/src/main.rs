//! Quay command-line tool
//!
//! Replays declarative scenarios against an in-memory channel ledger and
//! prints the effective ledger configuration.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use quay_core::LedgerConfig;
use std::io::Write;
use std::path::{Path, PathBuf};

mod runner;
mod scenario;

use runner::ScenarioRunner;

#[derive(Parser)]
#[command(name = "quay")]
#[command(about = "Quay - channel ledger with consumer-group leases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Ledger config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file, printing committed events as JSON lines
    Run {
        /// Scenario TOML file
        scenario: PathBuf,

        /// Print the final ledger state as JSON after the run
        #[arg(long)]
        dump_state: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            dump_state,
        } => run(&scenario, cli.config.as_deref(), dump_state).await,
        Commands::Config => {
            let config = LedgerConfig::resolve(cli.config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(path: &Path, config_path: Option<&Path>, dump_state: bool) -> Result<()> {
    let scenario = scenario::load_scenario(path)?;
    let config = match &scenario.setup.config {
        Some(config) => config.clone(),
        None => LedgerConfig::resolve(config_path)?,
    };
    tracing::info!(
        scenario = %scenario.metadata.name,
        steps = scenario.steps.len(),
        skip_policy = %config.skip_policy,
        "replaying scenario"
    );

    let stdout = std::io::stdout();
    let mut runner = ScenarioRunner::new(config, scenario.setup.start_secs, stdout.lock());
    let report = runner.run(&scenario).await?;

    if dump_state {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", runner.service().snapshot_json()?)?;
    }

    for failure in &report.failures {
        eprintln!(
            "step {} ({}): {}",
            failure.step, failure.op, failure.reason
        );
    }
    if !report.passed() {
        bail!(
            "scenario '{}' failed: {} of {} steps did not match",
            report.name,
            report.failures.len(),
            report.steps
        );
    }
    eprintln!(
        "scenario '{}' passed: {} steps, {} events",
        report.name, report.steps, report.events
    );
    Ok(())
}
