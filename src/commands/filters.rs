// ABOUTME: Manage saved per-table row filters
// ABOUTME: Filters are JSON predicate lists applied by manual and scheduled syncs

use super::AppContext;
use crate::filter::FilterPredicate;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Args)]
pub struct FiltersArgs {
    #[command(subcommand)]
    command: FilterCommands,
}

#[derive(Args)]
struct TableArgs {
    #[arg(long)]
    db: String,
    #[arg(long)]
    table: String,
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Print the filters saved for a table
    Get {
        #[command(flatten)]
        target: TableArgs,
    },
    /// Replace the filters saved for a table
    ///
    /// Example: --json '[{"column":"created_at","operator":"gte","value":"2024-01-01"}]'
    Set {
        #[command(flatten)]
        target: TableArgs,
        /// Predicate list as JSON
        #[arg(long, conflicts_with = "file")]
        json: Option<String>,
        /// Read the predicate list from a JSON file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Remove the filters saved for a table
    Clear {
        #[command(flatten)]
        target: TableArgs,
    },
}

pub async fn command(ctx: &AppContext, args: FiltersArgs) -> Result<()> {
    match args.command {
        FilterCommands::Get { target } => {
            let filters = ctx.filters.get(&target.db, &target.table).await;
            println!("{}", serde_json::to_string_pretty(&filters)?);
        }
        FilterCommands::Set { target, json, file } => {
            let raw = match (json, file) {
                (Some(json), _) => json,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Provide the filters with --json or --file"),
            };
            let filters = parse_filters(&raw)?;
            let count = filters.len();
            ctx.filters
                .set(&target.db, &target.table, filters)
                .await
                .context("Failed to save filters")?;
            if count == 0 {
                println!("Filters cleared for {}.{}", target.db.trim(), target.table.trim());
            } else {
                println!(
                    "Saved {} filter(s) for {}.{}",
                    count,
                    target.db.trim(),
                    target.table.trim()
                );
            }
        }
        FilterCommands::Clear { target } => {
            ctx.filters
                .clear(&target.db, &target.table)
                .await
                .context("Failed to clear filters")?;
            println!("Filters cleared for {}.{}", target.db.trim(), target.table.trim());
        }
    }
    Ok(())
}

fn parse_filters(raw: &str) -> Result<Vec<FilterPredicate>> {
    serde_json::from_str(raw).context(
        "Invalid filters: expected a JSON array of {column, operator, value} \
         with operator one of eq, gt, gte, lt, lte, range",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOperator;

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters(
            r#"[{"column":"d","operator":"range","value":["2024-01-01","2024-01-31"]}]"#,
        )
        .unwrap();
        assert_eq!(filters[0].operator, FilterOperator::Range);
        assert!(parse_filters(r#"[{"column":"d","operator":"like","value":"x"}]"#).is_err());
        assert!(parse_filters("[]").unwrap().is_empty());
    }
}
