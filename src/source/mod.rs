// ABOUTME: Source provider contract for reading databases, tables, schemas and rows
// ABOUTME: Live PostgreSQL and static JSON fixture implementations, chosen by configuration

pub mod fixture;
pub mod postgres;

use crate::config::{SourceConfig, SourceKind};
use crate::filter::FilterPredicate;
use crate::row::Row;
use crate::schema::RawTableSchema;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub use fixture::FixtureSource;
pub use postgres::PostgresSource;

/// Read access to a relational source.
///
/// Both implementations must agree on filter semantics: a row is returned by
/// `get_table_data` exactly when [`crate::filter::matches_all`] accepts it.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn list_tables(&self, db_name: &str) -> Result<Vec<String>>;

    async fn database_exists(&self, db_name: &str) -> Result<bool>;

    async fn table_exists(&self, db_name: &str, table_name: &str) -> Result<bool>;

    /// Column metadata in ordinal order plus declared key columns in key order.
    async fn get_table_schema(&self, db_name: &str, table_name: &str) -> Result<RawTableSchema>;

    /// All rows satisfying `filters`.
    async fn get_table_data(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
    ) -> Result<Vec<Row>>;

    /// At most `limit` unfiltered rows.
    async fn get_table_preview(
        &self,
        db_name: &str,
        table_name: &str,
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Release any open session. Safe to call repeatedly.
    async fn close(&self) -> Result<()>;
}

/// Build the source named by configuration.
pub async fn open_source(config: &SourceConfig) -> Result<Arc<dyn SourceProvider>> {
    match config.kind {
        SourceKind::Postgres => {
            let url = config
                .url
                .as_deref()
                .context("source.url is required for the postgres source")?;
            Ok(Arc::new(PostgresSource::new(url, config.accept_invalid_certs)?))
        }
        SourceKind::Fixture => {
            let path = config
                .fixture_path
                .as_deref()
                .context("source.fixture_path is required for the fixture source")?;
            Ok(Arc::new(FixtureSource::load(path).await?))
        }
    }
}
