// GAUNTLET v0.4 -- CONGESTION-CONTROL SCHEME HARNESS
// RUNS EACH SCHEME'S SENDER/RECEIVER PAIR UNDER A HARD TIME BUDGET,
// RECORDS PER-SECOND TELEMETRY, AND TEARS DOWN EVERY PROCESS GROUP
// BEFORE MOVING ON. NETWORK EMULATION AND PLOTTING LIVE ELSEWHERE.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gauntlet::config::{Config, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "gauntlet", version)]
#[command(about = "GAUNTLET -- CONGESTION-CONTROL SCHEME HARNESS")]
struct Cli {
    // CONFIG FILE. WITHOUT IT, ./gauntlet.toml IS READ IF PRESENT,
    // OTHERWISE BUILT-IN DEFAULTS APPLY
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run trials for every (profile, scheme) pair")]
    Run(cli::run::RunArgs),

    #[command(about = "Check tools, scheme wrappers, traces and kernel congestion controls")]
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path, true)?,
        None => Config::load(&PathBuf::from(DEFAULT_CONFIG_PATH), false)?,
    };

    match cli.command {
        Command::Run(args) => cli::run::run_batch(&config, &args),
        Command::Check => cli::check::run_check(&config),
    }
}
