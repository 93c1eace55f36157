// ABOUTME: Batch replicator - one end-to-end table sync from source to ingestion endpoint
// ABOUTME: Validates, derives the schema, reads filtered rows and sends sequential batches

use crate::error::SyncError;
use crate::filter::FilterPredicate;
use crate::ingest::{Ingest, SyncPayload};
use crate::schema::{translate, SchemaLimits};
use crate::source::SourceProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a successful table sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: u64,
    pub batches: usize,
    pub message: String,
}

/// A failed table sync, with the rows earlier batches already confirmed.
#[derive(Debug)]
pub struct SyncFailure {
    pub synced: u64,
    pub error: SyncError,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for SyncFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<SyncError> for SyncFailure {
    fn from(error: SyncError) -> Self {
        Self { synced: 0, error }
    }
}

/// Progress reported after each confirmed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch: usize,
    pub total_batches: usize,
    pub synced: u64,
    pub total_rows: usize,
}

pub struct Replicator {
    source: Arc<dyn SourceProvider>,
    ingest: Arc<dyn Ingest>,
    batch_size: usize,
    limits: SchemaLimits,
}

impl Replicator {
    pub fn new(
        source: Arc<dyn SourceProvider>,
        ingest: Arc<dyn Ingest>,
        batch_size: usize,
        limits: SchemaLimits,
    ) -> Self {
        Self {
            source,
            ingest,
            batch_size: batch_size.max(1),
            limits,
        }
    }

    pub fn source(&self) -> &Arc<dyn SourceProvider> {
        &self.source
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn replicate(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
    ) -> Result<SyncReport, SyncFailure> {
        self.replicate_with_progress(db_name, table_name, filters, |_| {})
            .await
    }

    /// Sync one table, calling `on_batch` after every confirmed batch.
    ///
    /// The source session is closed whether the sync succeeds or fails.
    pub async fn replicate_with_progress<F>(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
        on_batch: F,
    ) -> Result<SyncReport, SyncFailure>
    where
        F: Fn(BatchProgress) + Send + Sync,
    {
        let db_name = db_name.trim();
        let table_name = table_name.trim();

        if db_name.is_empty() {
            return Err(SyncError::validation("Database name is required.").into());
        }
        if table_name.is_empty() {
            return Err(SyncError::validation("Table name is required.").into());
        }

        let started = Instant::now();
        let result = self.run(db_name, table_name, filters, &on_batch).await;

        if let Err(e) = self.source.close().await {
            tracing::warn!("Failed to close source session: {:#}", e);
        }

        match &result {
            Ok(report) => tracing::info!(
                "{} ({} batch(es) in {:.1}s)",
                report.message,
                report.batches,
                started.elapsed().as_secs_f64()
            ),
            Err(failure) => tracing::error!(
                kind = failure.error.kind(),
                "Sync of {}.{} failed after {} confirmed row(s): {}",
                db_name,
                table_name,
                failure.synced,
                failure.error
            ),
        }

        result
    }

    async fn run(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
        on_batch: &(dyn Fn(BatchProgress) + Send + Sync),
    ) -> Result<SyncReport, SyncFailure> {
        if !self.source.database_exists(db_name).await.map_err(SyncError::from)? {
            return Err(SyncError::not_found(format!(
                "Database \"{}\" does not exist.",
                db_name
            ))
            .into());
        }
        if !self
            .source
            .table_exists(db_name, table_name)
            .await
            .map_err(SyncError::from)?
        {
            return Err(SyncError::not_found(format!(
                "Table \"{}\" does not exist in database \"{}\".",
                table_name, db_name
            ))
            .into());
        }

        let raw = self
            .source
            .get_table_schema(db_name, table_name)
            .await
            .map_err(SyncError::from)?;
        let schema = translate(&raw, &self.limits)?;

        let rows = self
            .source
            .get_table_data(db_name, table_name, filters)
            .await
            .map_err(SyncError::from)?;

        tracing::info!(
            "Syncing {} row(s) from {}.{} in batches of {}",
            rows.len(),
            db_name,
            table_name,
            self.batch_size
        );

        // An empty table still gets one request so the destination table is created
        let chunks: Vec<&[crate::row::Row]> = if rows.is_empty() {
            vec![&rows[..]]
        } else {
            rows.chunks(self.batch_size).collect()
        };
        let total_batches = chunks.len();

        let mut synced: u64 = 0;
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let payload = SyncPayload {
                table_name,
                table_config: &schema.columns,
                unique_keys: &schema.unique_keys,
                table_items: chunk,
            };

            let response = self
                .ingest
                .send_batch(&payload)
                .await
                .map_err(|error| SyncFailure { synced, error })?;

            synced += response.rows.unwrap_or(chunk.len() as u64);
            tracing::debug!(
                "Batch {}/{} for {} confirmed ({} rows so far)",
                idx + 1,
                total_batches,
                table_name,
                synced
            );
            on_batch(BatchProgress {
                batch: idx + 1,
                total_batches,
                synced,
                total_rows: rows.len(),
            });
        }

        Ok(SyncReport {
            synced,
            batches: total_batches,
            message: format!("Synced {} rows for table \"{}\".", synced, table_name),
        })
    }
}
