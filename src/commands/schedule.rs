// ABOUTME: Schedule management commands: set, clear, pause, resume and show
// ABOUTME: Changes are persisted; a running `run` process picks them up on its next reload

use super::AppContext;
use crate::scheduler::{TableRef, DEFAULT_NEXT_RUNS};
use anyhow::{bail, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct ScheduleArgs {
    #[command(subcommand)]
    command: ScheduleCommands,
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Set the recurring schedule (replaces any existing one)
    Set {
        /// Five-field cron expression, e.g. "*/30 * * * *"
        #[arg(long)]
        cron: String,
        /// Tables to sync, as db.table (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
    /// Remove the schedule
    Clear,
    /// Keep the schedule but skip its runs
    Pause,
    /// Resume a paused schedule
    Resume,
    /// Show the schedule and its upcoming runs
    Show {
        /// Number of upcoming runs to list
        #[arg(long, default_value_t = DEFAULT_NEXT_RUNS)]
        count: usize,
    },
}

pub async fn command(ctx: &AppContext, args: ScheduleArgs) -> Result<()> {
    let scheduler = ctx.scheduler().await?;
    scheduler.start().await?;

    let outcome: Result<()> = match args.command {
        ScheduleCommands::Set { cron, tables } => {
            let tables = parse_table_refs(&tables)?;
            match scheduler.set_schedule(&cron, &tables).await {
                Ok(next_runs) if next_runs.is_empty() => {
                    println!("Schedule cleared (no expression or tables given).");
                    Ok(())
                }
                Ok(next_runs) => {
                    println!("Schedule set: {}", cron.trim());
                    print_next_runs(&next_runs);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        ScheduleCommands::Clear => scheduler
            .clear_schedule()
            .await
            .map(|_| println!("Schedule cleared."))
            .map_err(Into::into),
        ScheduleCommands::Pause => scheduler
            .set_paused(true)
            .await
            .map(|_| println!("Schedule paused."))
            .map_err(Into::into),
        ScheduleCommands::Resume => scheduler
            .set_paused(false)
            .await
            .map(|_| println!("Schedule resumed."))
            .map_err(Into::into),
        ScheduleCommands::Show { count } => {
            let status = scheduler.status().await;
            match status.config {
                None => println!("No schedule is configured."),
                Some(config) => {
                    println!("Expression: {}", config.cron_expression);
                    println!("Paused:     {}", if status.paused { "yes" } else { "no" });
                    println!("Tables:");
                    for table in &config.selected_tables {
                        println!("  {}.{}", table.db_name, table.table_name);
                    }
                    print_next_runs(&scheduler.get_next_runs(count).await);
                }
            }
            Ok(())
        }
    };

    scheduler.shutdown().await;
    outcome
}

/// Parse `db.table` entries. The first dot separates database from table so
/// schema-qualified names such as `sales.public.orders` keep their schema.
pub fn parse_table_refs(values: &[String]) -> Result<Vec<TableRef>> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| match value.split_once('.') {
            Some((db, table)) if !db.trim().is_empty() && !table.trim().is_empty() => {
                Ok(TableRef::new(db.trim(), table.trim()))
            }
            _ => bail!("Invalid table '{}': expected db.table", value),
        })
        .collect()
}

fn print_next_runs(runs: &[DateTime<Utc>]) {
    if runs.is_empty() {
        return;
    }
    println!("Next runs:");
    for run in runs {
        println!(
            "  {}  ({} local)",
            run.to_rfc3339(),
            run.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }
}
