// ABOUTME: Cron scheduler owning the single recurring sync job, its persistence and pause state
// ABOUTME: Each tick replicates the selected tables sequentially and records outcomes in the audit log

use crate::audit::{AuditLog, NewLogEntry};
use crate::error::{SyncError, SyncResult};
use crate::filter_store::FilterStore;
use crate::replicator::Replicator;
use crate::store::{self, DocumentStore, SCHEDULE_DOC};
use chrono::{DateTime, Local, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Upcoming fire times returned after registering a schedule.
pub const DEFAULT_NEXT_RUNS: usize = 2;

/// One table selected for replication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub db_name: String,
    pub table_name: String,
}

impl TableRef {
    pub fn new(db_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
        }
    }

    fn trimmed(&self) -> Self {
        Self::new(self.db_name.trim(), self.table_name.trim())
    }
}

/// The persisted recurring job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub cron_expression: String,
    pub selected_tables: Vec<TableRef>,
    #[serde(default)]
    pub paused: bool,
}

/// Trim names, drop blank entries and keep the first occurrence of each table.
pub fn dedupe_tables(tables: &[TableRef]) -> Vec<TableRef> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(tables.len());
    for table in tables.iter().map(TableRef::trimmed) {
        if table.db_name.is_empty() || table.table_name.is_empty() {
            tracing::warn!("Ignoring table entry with a blank database or table name");
            continue;
        }
        if seen.insert(table.clone()) {
            unique.push(table);
        }
    }
    unique
}

/// Parse a five-field cron expression (minute hour day-of-month month day-of-week).
pub fn parse_expression(expr: &str) -> SyncResult<Cron> {
    let expr = expr.trim();
    if expr.split_whitespace().count() != 5 {
        return Err(SyncError::validation("Invalid CRON expression"));
    }
    Cron::new(expr)
        .parse()
        .map_err(|_| SyncError::validation("Invalid CRON expression"))
}

/// Next `count` fire times after `from`, in `from`'s time zone.
fn upcoming<Tz: chrono::TimeZone>(schedule: &Cron, from: DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
    let mut out = Vec::with_capacity(count);
    let mut cursor = from;
    while out.len() < count {
        match schedule.find_next_occurrence(&cursor, false) {
            Ok(next) => {
                cursor = next.clone();
                out.push(next);
            }
            Err(_) => break,
        }
    }
    out
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ran(RunSummary),
    Paused,
    /// A previous run was still in progress.
    Overlapped,
    NoSchedule,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub synced: u64,
}

/// Snapshot for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleStatus {
    pub config: Option<ScheduleConfig>,
    pub active: bool,
    pub paused: bool,
    pub next_runs: Vec<DateTime<Utc>>,
}

struct Job {
    expression: String,
    schedule: Cron,
    tables: Vec<TableRef>,
    handle: JoinHandle<()>,
}

/// State shared with the job task and spawned runs.
struct Shared {
    store: Arc<dyn DocumentStore>,
    audit: Arc<AuditLog>,
    filters: Arc<FilterStore>,
    replicator: Arc<Replicator>,
    paused: AtomicBool,
    in_progress: AtomicBool,
    live_jobs: AtomicUsize,
}

/// Clears the in-progress flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Counts live job loops so replacement can be observed.
struct JobToken(Arc<Shared>);

impl Drop for JobToken {
    fn drop(&mut self) {
        self.0.live_jobs.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    async fn tick(&self, tables: &[TableRef]) -> TickOutcome {
        if self.paused.load(Ordering::SeqCst) {
            tracing::debug!("Schedule is paused; skipping tick");
            return TickOutcome::Paused;
        }
        self.run_scheduled_sync(tables).await
    }

    async fn run_scheduled_sync(&self, tables: &[TableRef]) -> TickOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Previous scheduled run still in progress; dropping tick");
            return TickOutcome::Overlapped;
        }
        let _guard = RunGuard(&self.in_progress);

        let tables = dedupe_tables(tables);
        tracing::info!("Scheduled run started for {} table(s)", tables.len());

        let mut summary = RunSummary::default();
        for table in &tables {
            let filters = self.filters.get(&table.db_name, &table.table_name).await;
            let entry = match self
                .replicator
                .replicate(&table.db_name, &table.table_name, &filters)
                .await
            {
                Ok(report) => {
                    summary.succeeded += 1;
                    summary.synced += report.synced;
                    NewLogEntry::success(
                        &table.db_name,
                        &table.table_name,
                        report.message,
                        report.synced,
                    )
                }
                Err(failure) => {
                    summary.failed += 1;
                    summary.synced += failure.synced;
                    NewLogEntry::failure(
                        &table.db_name,
                        &table.table_name,
                        failure.error.to_string(),
                        failure.synced,
                    )
                }
            };

            if let Err(e) = self.audit.append(entry).await {
                tracing::warn!(
                    "Failed to record outcome for {}.{}: {:#}",
                    table.db_name,
                    table.table_name,
                    e
                );
            }
        }

        tracing::info!(
            "Scheduled run finished: {} succeeded, {} failed, {} row(s) synced",
            summary.succeeded,
            summary.failed,
            summary.synced
        );
        TickOutcome::Ran(summary)
    }
}

async fn job_loop(shared: Arc<Shared>, schedule: Cron, tables: Vec<TableRef>) {
    let _token = JobToken(shared.clone());
    let mut last_fire: Option<DateTime<Local>> = None;

    loop {
        let now = Local::now();
        let from = match last_fire {
            Some(fired) if fired > now => fired,
            _ => now,
        };
        let next = match schedule.find_next_occurrence(&from, false) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!("Schedule has no further occurrences: {}", e);
                return;
            }
        };

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        last_fire = Some(next);

        // Runs get their own task so the loop keeps its cadence
        let shared = shared.clone();
        let tables = tables.clone();
        tokio::spawn(async move {
            shared.tick(&tables).await;
        });
    }
}

/// Owns the single recurring job. All mutation goes through these methods,
/// which hold the job lock so two jobs can never be registered at once.
pub struct Scheduler {
    shared: Arc<Shared>,
    job: Mutex<Option<Job>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        audit: Arc<AuditLog>,
        filters: Arc<FilterStore>,
        replicator: Arc<Replicator>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                audit,
                filters,
                replicator,
                paused: AtomicBool::new(false),
                in_progress: AtomicBool::new(false),
                live_jobs: AtomicUsize::new(0),
            }),
            job: Mutex::new(None),
        }
    }

    /// Restore the persisted schedule. An unusable one is deleted with a warning.
    pub async fn start(&self) -> SyncResult<()> {
        let mut job = self.job.lock().await;
        self.stop_job(&mut job).await;

        let Some(config) =
            store::load_json::<ScheduleConfig>(self.shared.store.as_ref(), SCHEDULE_DOC).await
        else {
            tracing::debug!("No persisted schedule");
            return Ok(());
        };

        let tables = dedupe_tables(&config.selected_tables);
        let expr = config.cron_expression.trim();
        if expr.is_empty() || tables.is_empty() {
            tracing::warn!("Persisted schedule is empty; clearing it");
            return self.delete_config().await;
        }

        let schedule = match parse_expression(expr) {
            Ok(schedule) => schedule,
            Err(_) => {
                tracing::warn!("Persisted schedule has an invalid CRON expression '{}'; clearing it", expr);
                return self.delete_config().await;
            }
        };

        self.shared.paused.store(config.paused, Ordering::SeqCst);
        *job = Some(self.spawn_job(expr, schedule, tables));
        tracing::info!(
            "Restored schedule '{}'{}",
            expr,
            if config.paused { " (paused)" } else { "" }
        );
        Ok(())
    }

    /// Replace the schedule. Empty input clears it. Returns the next fire times.
    ///
    /// On a store failure, disk and runtime still describe the same schedule.
    pub async fn set_schedule(
        &self,
        expr: &str,
        tables: &[TableRef],
    ) -> SyncResult<Vec<DateTime<Utc>>> {
        let mut job = self.job.lock().await;
        let expr = expr.trim();
        let tables = dedupe_tables(tables);

        self.delete_config().await?;
        self.stop_job(&mut job).await;
        self.shared.paused.store(false, Ordering::SeqCst);

        if expr.is_empty() || tables.is_empty() {
            return Ok(Vec::new());
        }

        // An invalid expression leaves no schedule behind
        let schedule = parse_expression(expr)?;

        let config = ScheduleConfig {
            cron_expression: expr.to_string(),
            selected_tables: tables.clone(),
            paused: false,
        };
        self.save_config(&config).await?;

        let next_runs = upcoming(&schedule, Local::now(), DEFAULT_NEXT_RUNS)
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .collect();
        *job = Some(self.spawn_job(expr, schedule, tables));
        tracing::info!("Schedule set to '{}'", expr);
        Ok(next_runs)
    }

    pub async fn clear_schedule(&self) -> SyncResult<()> {
        let mut job = self.job.lock().await;
        self.delete_config().await?;
        self.stop_job(&mut job).await;
        self.shared.paused.store(false, Ordering::SeqCst);
        tracing::info!("Schedule cleared");
        Ok(())
    }

    /// Pause or resume. The job stays registered either way.
    pub async fn set_paused(&self, paused: bool) -> SyncResult<()> {
        let job = self.job.lock().await;
        let Some(current) = job.as_ref() else {
            return Err(SyncError::validation("No schedule is configured."));
        };

        let config = ScheduleConfig {
            cron_expression: current.expression.clone(),
            selected_tables: current.tables.clone(),
            paused,
        };
        self.save_config(&config).await?;
        self.shared.paused.store(paused, Ordering::SeqCst);
        tracing::info!("Schedule {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }

    /// Run the given tables now under the overlap guard, ignoring the pause flag.
    pub async fn run_scheduled_sync(&self, tables: &[TableRef]) -> TickOutcome {
        self.shared.run_scheduled_sync(tables).await
    }

    /// Fire the registered job once, exactly as the timer would.
    pub async fn tick(&self) -> TickOutcome {
        let tables = match self.job.lock().await.as_ref() {
            Some(job) => job.tables.clone(),
            None => return TickOutcome::NoSchedule,
        };
        self.shared.tick(&tables).await
    }

    /// Next `count` fire times of the registered expression, computed in the
    /// host's local time zone and reported in UTC.
    pub async fn get_next_runs(&self, count: usize) -> Vec<DateTime<Utc>> {
        match self.job.lock().await.as_ref() {
            Some(job) => upcoming(&job.schedule, Local::now(), count)
                .into_iter()
                .map(|dt| dt.with_timezone(&Utc))
                .collect(),
            None => Vec::new(),
        }
    }

    pub async fn has_active_job(&self) -> bool {
        self.job
            .lock()
            .await
            .as_ref()
            .is_some_and(|job| !job.handle.is_finished())
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.in_progress.load(Ordering::SeqCst)
    }

    /// Number of live job loops. Never more than one.
    pub fn running_jobs(&self) -> usize {
        self.shared.live_jobs.load(Ordering::SeqCst)
    }

    pub async fn current_config(&self) -> Option<ScheduleConfig> {
        store::load_json(self.shared.store.as_ref(), SCHEDULE_DOC).await
    }

    pub async fn status(&self) -> ScheduleStatus {
        ScheduleStatus {
            config: self.current_config().await,
            active: self.has_active_job().await,
            paused: self.is_paused(),
            next_runs: self.get_next_runs(DEFAULT_NEXT_RUNS).await,
        }
    }

    /// Stop the job without touching the persisted schedule.
    pub async fn shutdown(&self) {
        let mut job = self.job.lock().await;
        self.stop_job(&mut job).await;
    }

    fn spawn_job(&self, expr: &str, schedule: Cron, tables: Vec<TableRef>) -> Job {
        self.shared.live_jobs.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(job_loop(
            self.shared.clone(),
            schedule.clone(),
            tables.clone(),
        ));
        Job {
            expression: expr.to_string(),
            schedule,
            tables,
            handle,
        }
    }

    async fn stop_job(&self, job: &mut Option<Job>) {
        if let Some(previous) = job.take() {
            previous.handle.abort();
            // Wait for cancellation so the old loop is gone before a new one starts
            let _ = previous.handle.await;
            tracing::debug!("Stopped job for '{}'", previous.expression);
        }
    }

    async fn save_config(&self, config: &ScheduleConfig) -> SyncResult<()> {
        store::save_json(self.shared.store.as_ref(), SCHEDULE_DOC, config)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))
    }

    async fn delete_config(&self) -> SyncResult<()> {
        self.shared
            .store
            .delete(SCHEDULE_DOC)
            .await
            .map_err(|e| SyncError::Persistence(format!("{:#}", e)))
    }
}
