//! Payveil command-line interface
//!
//! Runs the confidential value lifecycle against an in-process ledger:
//! a guided walkthrough, scripted sessions, and config inspection.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod session;

#[derive(Parser)]
#[command(name = "payveil")]
#[command(about = "Payveil - confidential rate records with selective disclosure", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "payveil.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through create, decrypt, race and refresh with two actors
    Demo,

    /// Execute a TOML session script
    Run {
        /// Script file
        script: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_writer(std::io::stderr)
        .init();

    let config = config::load(&cli.config)?;

    match cli.command {
        Commands::Demo => commands::demo::run(config).await?,
        Commands::Run { script } => commands::script::run(config, &script).await?,
        Commands::Config => commands::show_config(&config)?,
    }

    Ok(())
}

/// `--verbose` forces debug; otherwise `RUST_LOG`, falling back to info.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn verbose_overrides_environment() {
        assert_eq!(log_filter(true).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["payveil", "config", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config));
    }
}
