//! Vaultsync CLI - Command-line interface for Vaultsync
//!
//! Provides commands for:
//! - One-shot database and directory backups
//! - Running the scheduled backup worker
//! - Managing backup schedules
//! - Inspecting and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    backup::{DbCommand, DirCommand},
    completions::CompletionsCommand,
    config::ConfigCommand,
    schedule::ScheduleCommand,
    worker::WorkerCommand,
    CommandContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "vaultsync", version, about = "Scheduled PostgreSQL and directory backups to object storage")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database backups
    #[command(subcommand)]
    Db(DbCommand),
    /// Directory backups
    #[command(subcommand)]
    Dir(DirCommand),
    /// Run scheduled backups until interrupted
    Worker(WorkerCommand),
    /// Manage backup schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v / --quiet
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(matches!(cli.command, Commands::Worker(_)))
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext::new(cli.config.clone(), format, cli.quiet);

    let result = match &cli.command {
        Commands::Db(cmd) => cmd.execute(&ctx).await,
        Commands::Dir(cmd) => cmd.execute(&ctx).await,
        Commands::Worker(cmd) => cmd.execute(&ctx).await,
        Commands::Schedule(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(err) = result {
        get_formatter(cli.json).error(&format!("{err:#}"));
        std::process::exit(1);
    }
    Ok(())
}
