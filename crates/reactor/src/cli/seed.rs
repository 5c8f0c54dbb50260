use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;

use reactor::prelude::*;

use super::{header, print_json, report};

/// Manage data seeds.
#[derive(Parser)]
pub struct SeedCommand {
    #[command(subcommand)]
    pub action: SeedAction,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum SeedAction {
    /// Run seeds according to their strategies.
    Run {
        /// Show which seeds would run, and why, without running any.
        #[arg(long)]
        dry_run: bool,
    },
}

impl SeedCommand {
    pub async fn execute(self, config: &ReactorConfig, cancel: &CancellationToken) -> Result<()> {
        let reactor = ReactorBuilder::from_config(config)?.build()?;
        let outcome = self.dispatch(&reactor, cancel).await;
        reactor.close().await;
        outcome
    }

    async fn dispatch(&self, reactor: &Reactor, cancel: &CancellationToken) -> Result<()> {
        match self.action {
            SeedAction::Run { dry_run: true } => {
                let preview = reactor.preview_seeds(cancel).await?;
                self.print_preview(&preview)
            }
            SeedAction::Run { dry_run: false } => {
                if !self.json {
                    header("Seeds");
                }
                report(&reactor.execute_seeds(cancel).await, self.json)
            }
        }
    }

    fn print_preview(&self, preview: &SeedPreview) -> Result<()> {
        if self.json {
            return print_json(preview);
        }

        header("Seed Preview");
        if preview.seeds.is_empty() {
            println!("  {} No seeds found", style("ℹ").blue());
            return Ok(());
        }

        for seed in &preview.seeds {
            let marker = if seed.will_execute() {
                style("→").yellow()
            } else {
                style("-").dim()
            };
            println!(
                "    {} {} {} {}",
                marker,
                style(&seed.name).cyan(),
                style(format!("[{}]", seed.strategy)).dim(),
                seed.reason
            );
        }
        println!();
        println!(
            "  {} {} would run, {} would skip",
            style("ℹ").blue(),
            preview.would_run().count(),
            preview.would_skip().count()
        );
        println!();
        Ok(())
    }
}
