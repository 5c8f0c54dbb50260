mod migrate;
mod seed;

pub use migrate::MigrateCommand;
pub use seed::SeedCommand;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reactor::prelude::*;

/// Reactor - migration and seed execution engine
#[derive(Parser)]
#[command(name = "reactor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path.
    #[arg(short, long, default_value = "reactor.toml", global = true)]
    pub config: PathBuf,

    /// Verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage database migrations.
    Migrate(MigrateCommand),

    /// Manage data seeds.
    Seed(SeedCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        init_tracing(self.verbose);

        // Load .env if present
        dotenvy::dotenv().ok();

        let config = load_config(&self.config)?;
        let cancel = cancel_on_ctrl_c();

        match self.command {
            Commands::Migrate(cmd) => cmd.execute(&config, &cancel).await,
            Commands::Seed(cmd) => cmd.execute(&config, &cancel).await,
        }
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<ReactorConfig> {
    if !path.exists() {
        anyhow::bail!(
            "Configuration file not found: {}\nCreate one with at least a [database] url.",
            path.display()
        );
    }
    info!("Loading configuration from {}", path.display());
    ReactorConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Token cancelled on the first Ctrl-C. The running script still finishes.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current script");
            token.cancel();
        }
    });
    cancel
}

fn header(title: &str) {
    println!();
    println!(
        "  {}  {} {}",
        style("⚗").bold(),
        style("REACTOR").bold().cyan(),
        title
    );
    println!();
}

/// Print a run outcome and turn a failed run into an error exit.
fn report(result: &RunResult, json: bool) -> Result<()> {
    if json {
        let value = json!({
            "successful": result.successful,
            "error_message": result.error_message(),
            "applied_scripts": result.applied_scripts,
            "skipped_scripts": result.skipped_scripts,
            "failed_script": result.failed_script,
            "execution_time_ms": result.execution_time_ms,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        for name in &result.applied_scripts {
            println!("  {} {}", style("✓").green(), name);
        }
        if let Some(name) = &result.failed_script {
            println!("  {} {}", style("✗").red(), style(name).red());
        }
        println!();
        println!(
            "  {} {} applied, {} skipped in {}ms",
            style("ℹ").blue(),
            result.applied_scripts.len(),
            result.skipped_scripts.len(),
            result.execution_time_ms
        );
        println!();
    }

    match result.error_message() {
        Some(message) if !result.successful => anyhow::bail!(message),
        _ => Ok(()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
