use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use tokio_util::sync::CancellationToken;

use reactor::prelude::*;
use reactor::reactor_core::result::AppliedMigration;

use super::{header, print_json, report};

/// Manage database migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    #[command(subcommand)]
    pub action: MigrateAction,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Run all pending migrations.
    Up {
        /// Show what would run without changing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert the last applied migration.
    Down {
        /// Revert every applied migration, newest first.
        #[arg(long)]
        all: bool,

        /// Show what would be reverted without changing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status.
    Status,
}

impl MigrateCommand {
    pub async fn execute(self, config: &ReactorConfig, cancel: &CancellationToken) -> Result<()> {
        let reactor = ReactorBuilder::from_config(config)?.build()?;
        let outcome = self.dispatch(&reactor, cancel).await;
        reactor.close().await;
        outcome
    }

    async fn dispatch(&self, reactor: &Reactor, cancel: &CancellationToken) -> Result<()> {
        match self.action {
            MigrateAction::Up { dry_run: true } => {
                let preview = reactor.run_preview(cancel).await?;
                self.print_preview("Pending migrations", &preview)
            }
            MigrateAction::Up { dry_run: false } => {
                if !self.json {
                    header("Migrations");
                }
                report(&reactor.run(cancel).await, self.json)
            }
            MigrateAction::Down { all, dry_run } => {
                let mode = if all {
                    DowngradeMode::All
                } else {
                    DowngradeMode::Last
                };
                if dry_run {
                    let preview = reactor.preview_downgrade(mode, cancel).await?;
                    self.print_preview("Migrations to revert", &preview)
                } else {
                    if !self.json {
                        header("Downgrade");
                    }
                    report(&reactor.downgrade(mode, cancel).await, self.json)
                }
            }
            MigrateAction::Status => {
                let status = reactor.status(cancel).await?;
                self.print_status(&status)
            }
        }
    }

    fn print_preview(&self, title: &str, preview: &DryRunResult) -> Result<()> {
        if self.json {
            return print_json(preview);
        }

        header(title);
        if preview.pending.is_empty() {
            println!("  {} Nothing to do", style("ℹ").blue());
        }
        for name in preview.pending_names() {
            println!("    {} {}", style("→").dim(), style(name).yellow());
        }
        println!();
        println!(
            "  {} {} pending ({} up, {} down), {} skipped, {} total",
            style("ℹ").blue(),
            preview.pending_migrations,
            preview.pending_upgrades,
            preview.pending_downgrades,
            preview.skipped_migrations,
            preview.total_migrations
        );
        println!();
        Ok(())
    }

    fn print_status(&self, status: &MigrationStatus) -> Result<()> {
        if self.json {
            return print_json(status);
        }

        header("Migration Status");

        let width = status
            .applied
            .iter()
            .map(|m| m.name.len())
            .chain(status.pending.iter().map(String::len))
            .max()
            .unwrap_or(0);
        if width == 0 {
            println!("  {} Nothing discovered and nothing journaled", style("ℹ").blue());
            println!();
            return Ok(());
        }

        for m in &status.applied {
            println!("{}", applied_row(m, width));
        }
        for name in &status.pending {
            println!(
                "  {}  {:<width$}",
                style("pending").yellow(),
                style(name).bold(),
                width = width
            );
        }

        let orphans = status.applied.iter().filter(|m| !m.discovered).count();
        println!();
        println!(
            "  {} {} applied ({} orphaned), {} pending",
            style("ℹ").blue(),
            status.applied.len(),
            orphans,
            status.pending.len()
        );
        if orphans > 0 {
            println!(
                "  {} orphaned entries have no matching script and cannot be reverted",
                style("!").yellow()
            );
        }
        println!();
        Ok(())
    }
}

/// One aligned status line for a journaled migration.
fn applied_row(m: &AppliedMigration, width: usize) -> String {
    let state = if m.discovered {
        style("applied").green()
    } else {
        style("orphan ").red()
    };
    let revert = if m.has_down {
        style("reversible").dim()
    } else {
        style("one-way").dim()
    };
    format!(
        "  {}  {:<width$}  {}  {}",
        state,
        m.name,
        m.applied_at.format("%Y-%m-%d %H:%M:%S"),
        revert,
        width = width
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn applied(name: &str, has_down: bool, discovered: bool) -> AppliedMigration {
        AppliedMigration {
            name: name.to_string(),
            applied_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            has_down,
            discovered,
        }
    }

    #[test]
    fn test_applied_row_alignment_and_markers() {
        console::set_colors_enabled(false);

        let row = applied_row(&applied("0001_a", true, true), 12);
        assert_eq!(row, "  applied  0001_a        2024-03-01 09:30:00  reversible");

        let orphan = applied_row(&applied("0002_gone", false, false), 12);
        assert!(orphan.starts_with("  orphan   0002_gone"));
        assert!(orphan.ends_with("one-way"));
    }
}
