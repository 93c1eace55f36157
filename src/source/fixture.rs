// ABOUTME: Static JSON fixture source used for local development and tests
// ABOUTME: Filters are evaluated in memory with the same compiled predicates as SQL pushdown

use super::SourceProvider;
use crate::filter::{CompiledFilter, FilterPredicate};
use crate::row::Row;
use crate::schema::{RawColumn, RawTableSchema};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Fixture document layout:
///
/// ```json
/// { "databases": { "sales": { "tables": { "orders": {
///     "columns": [{ "name": "id", "data_type": "int" }],
///     "key_columns": ["id"],
///     "rows": [{ "id": 1 }]
/// } } } } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub databases: BTreeMap<String, FixtureDatabase>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureDatabase {
    #[serde(default)]
    pub tables: BTreeMap<String, FixtureTable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureTable {
    #[serde(default)]
    pub columns: Vec<RawColumn>,
    #[serde(default)]
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone)]
pub struct FixtureSource {
    document: FixtureDocument,
}

impl FixtureSource {
    pub fn new(document: FixtureDocument) -> Self {
        Self { document }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
        let document: FixtureDocument = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse fixture file {}", path.display()))?;

        tracing::debug!(
            "Loaded fixture {} with {} database(s)",
            path.display(),
            document.databases.len()
        );
        Ok(Self::new(document))
    }

    fn table(&self, db_name: &str, table_name: &str) -> Result<&FixtureTable> {
        self.document
            .databases
            .get(db_name)
            .and_then(|db| db.tables.get(table_name))
            .with_context(|| {
                format!(
                    "Table \"{}\" not found in fixture data for database \"{}\".",
                    table_name, db_name
                )
            })
    }
}

#[async_trait]
impl SourceProvider for FixtureSource {
    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.document.databases.keys().cloned().collect())
    }

    async fn list_tables(&self, db_name: &str) -> Result<Vec<String>> {
        Ok(self
            .document
            .databases
            .get(db_name)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn database_exists(&self, db_name: &str) -> Result<bool> {
        Ok(self.document.databases.contains_key(db_name))
    }

    async fn table_exists(&self, db_name: &str, table_name: &str) -> Result<bool> {
        Ok(self
            .document
            .databases
            .get(db_name)
            .is_some_and(|db| db.tables.contains_key(table_name)))
    }

    async fn get_table_schema(&self, db_name: &str, table_name: &str) -> Result<RawTableSchema> {
        let table = self.table(db_name, table_name)?;
        Ok(RawTableSchema {
            columns: table.columns.clone(),
            key_columns: table.key_columns.clone(),
        })
    }

    async fn get_table_data(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
    ) -> Result<Vec<Row>> {
        let table = self.table(db_name, table_name)?;
        let compiled = CompiledFilter::compile(filters);
        Ok(table
            .rows
            .iter()
            .filter(|row| compiled.matches(row))
            .cloned()
            .collect())
    }

    async fn get_table_preview(
        &self,
        db_name: &str,
        table_name: &str,
        limit: usize,
    ) -> Result<Vec<Row>> {
        let table = self.table(db_name, table_name)?;
        Ok(table.rows.iter().take(limit).cloned().collect())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
