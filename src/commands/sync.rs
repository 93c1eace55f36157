// ABOUTME: Manual one-table sync command with interactive prompts for missing names
// ABOUTME: Records the outcome in the audit log just like a scheduled run

use super::AppContext;
use crate::audit::NewLogEntry;
use crate::replicator::BatchProgress;
use crate::source::SourceProvider;
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

pub struct SyncOptions {
    pub db_name: Option<String>,
    pub table_name: Option<String>,
    pub no_filters: bool,
}

pub async fn sync(ctx: &AppContext, opts: SyncOptions) -> Result<()> {
    let replicator = ctx.replicator().await?;

    let db_name = match non_blank(opts.db_name) {
        Some(name) => name,
        None => prompt_database(replicator.source().as_ref()).await?,
    };
    let table_name = match non_blank(opts.table_name) {
        Some(name) => name,
        None => prompt_table(replicator.source().as_ref(), &db_name).await?,
    };

    let filters = if opts.no_filters {
        Vec::new()
    } else {
        ctx.filters.get(&db_name, &table_name).await
    };
    if !filters.is_empty() {
        println!("Applying {} saved filter(s) to {}.{}", filters.len(), db_name, table_name);
    }

    println!(
        "Checking database and table (batches of {} rows)...",
        replicator.batch_size()
    );
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message(format!("Syncing {}.{}", db_name, table_name));

    let result = replicator
        .replicate_with_progress(&db_name, &table_name, &filters, |p: BatchProgress| {
            spinner.set_message(format!(
                "Batch {}/{} sent ({} of {} rows confirmed)",
                p.batch, p.total_batches, p.synced, p.total_rows
            ));
        })
        .await;
    spinner.finish_and_clear();

    let entry = match &result {
        Ok(report) => NewLogEntry::success(&db_name, &table_name, report.message.clone(), report.synced),
        Err(failure) => NewLogEntry::failure(
            &db_name,
            &table_name,
            failure.error.to_string(),
            failure.synced,
        ),
    };
    if let Err(e) = ctx.audit.append(entry).await {
        tracing::warn!("Failed to record sync outcome: {:#}", e);
    }

    match result {
        Ok(report) => {
            println!("\u{2713} {}", report.message);
            Ok(())
        }
        Err(failure) => {
            if failure.synced > 0 {
                println!("  {} row(s) were confirmed before the failure", failure.synced);
            }
            Err(failure).context(format!("Sync of {}.{} failed", db_name, table_name))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn ensure_interactive(what: &str) -> Result<()> {
    if !std::io::stdin().is_terminal() {
        bail!("{} is required (pass it as a flag when not running interactively)", what);
    }
    Ok(())
}

async fn prompt_database(source: &dyn SourceProvider) -> Result<String> {
    ensure_interactive("Database name")?;
    let databases = source.list_databases().await.unwrap_or_default();
    choose_or_type("Select database", "Enter database name", &databases)
}

async fn prompt_table(source: &dyn SourceProvider, db_name: &str) -> Result<String> {
    ensure_interactive("Table name")?;
    let tables = source.list_tables(db_name).await.unwrap_or_default();
    choose_or_type("Select table", "Enter table name", &tables)
}

fn choose_or_type(select_prompt: &str, input_prompt: &str, options: &[String]) -> Result<String> {
    let theme = ColorfulTheme::default();
    if options.is_empty() {
        let value: String = Input::with_theme(&theme)
            .with_prompt(input_prompt)
            .interact_text()
            .context("Input cancelled")?;
        return Ok(value.trim().to_string());
    }

    let idx = Select::with_theme(&theme)
        .with_prompt(select_prompt)
        .items(options)
        .default(0)
        .interact()
        .context("Selection cancelled")?;
    Ok(options[idx].clone())
}
