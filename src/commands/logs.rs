// ABOUTME: Shows recent sync outcomes from the audit log, newest first
// ABOUTME: Also lists the next scheduled runs when a schedule is configured

use super::AppContext;
use crate::audit::{SyncLogEntry, SyncStatus};
use crate::scheduler::{parse_expression, ScheduleConfig};
use crate::store::{self, SCHEDULE_DOC};
use anyhow::Result;
use chrono::{Local, Utc};

/// Upcoming runs listed alongside the log.
const LOG_VIEW_NEXT_RUNS: usize = 3;

pub async fn command(ctx: &AppContext, limit: usize, json: bool) -> Result<()> {
    let entries = ctx.audit.load_all().await;
    let shown: Vec<&SyncLogEntry> = entries.iter().take(limit).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("No sync runs recorded yet.");
    }
    for entry in &shown {
        println!("{}", format_entry(entry));
    }
    if entries.len() > shown.len() {
        println!("... {} older entries not shown", entries.len() - shown.len());
    }

    // Read the persisted schedule directly so no source connection is needed
    if let Some(config) = store::load_json::<ScheduleConfig>(ctx.store.as_ref(), SCHEDULE_DOC).await {
        if let Ok(schedule) = parse_expression(&config.cron_expression) {
            println!();
            println!(
                "Schedule '{}'{}",
                config.cron_expression,
                if config.paused { " (paused)" } else { "" }
            );
            let mut cursor = Local::now();
            for _ in 0..LOG_VIEW_NEXT_RUNS {
                match schedule.find_next_occurrence(&cursor, false) {
                    Ok(next) => {
                        println!("  next: {}", next.with_timezone(&Utc).to_rfc3339());
                        cursor = next;
                    }
                    Err(_) => break,
                }
            }
        }
    }
    Ok(())
}

fn format_entry(entry: &SyncLogEntry) -> String {
    let status = match entry.status {
        SyncStatus::Success => "ok   ",
        SyncStatus::Error => "error",
    };
    let mut line = format!(
        "{}  {}  {}.{}",
        entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        status,
        entry.db_name,
        entry.table_name
    );
    if let Some(synced) = entry.synced {
        line.push_str(&format!("  rows={}", synced));
    }
    if let Some(message) = &entry.message {
        line.push_str("  ");
        line.push_str(message);
    }
    line
}
