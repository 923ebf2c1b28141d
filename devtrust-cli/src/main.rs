//! DevTrust CLI - device identity and configuration pack tooling

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;
use std::sync::Arc;

use devtrust_cli::{default_config_dir, CaCommand, CliContext, PackCommand, PkiCommand};
use devtrust_common::logging::{Component, Logger};

#[derive(Parser)]
#[command(name = "devtrust")]
#[command(about = "DevTrust - device PKI and encrypted configuration packs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration directory (default: ~/.devtrust)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Device key pair and certificate lifecycle
    #[command(subcommand)]
    Pki(PkiCommand),
    /// Encrypted configuration packs
    #[command(subcommand)]
    Pack(PackCommand),
    /// Lab certificate authority
    #[command(subcommand)]
    Ca(CaCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", level));

    let logger = Arc::new(Logger::new_root(Component::CLI, "devtrust"));

    let output = match &cli.command {
        Commands::Ca(command) => command.run(logger)?,
        Commands::Pki(command) => {
            let ctx = open_context(cli.config_dir, logger)?;
            command.run(&ctx)?
        }
        Commands::Pack(command) => {
            let ctx = open_context(cli.config_dir, logger)?;
            command.run(&ctx)?
        }
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn open_context(config_dir: Option<PathBuf>, logger: Arc<Logger>) -> Result<CliContext> {
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {config_dir:?}"))?;
    CliContext::open(config_dir, logger)
}
