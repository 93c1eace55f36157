// ABOUTME: Live PostgreSQL source built on tokio-postgres with optional native-tls
// ABOUTME: Keeps one cached session, reopened when a different database is requested

use super::SourceProvider;
use crate::filter::{build_where_clause, FilterPredicate};
use crate::row::{Cell, Row};
use crate::schema::{RawColumn, RawTableSchema};
use crate::utils::{
    quote_ident, replace_database_in_connection_string, retry_with_backoff, ssl_mode,
    strip_password_from_url, validate_connection_string,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

const DEFAULT_SCHEMA: &str = "public";

/// Applied to every new session. Timestamps then render in UTC text, the same
/// clock the decoded cells use, and dates render as `YYYY-MM-DD`.
const SESSION_SETUP_SQL: &str = "SET TIME ZONE 'UTC'; SET DateStyle TO 'ISO, YMD'";

const TABLE_EXISTS_SQL: &str = "SELECT 1 FROM information_schema.tables
     WHERE table_type = 'BASE TABLE'
       AND table_schema = $1::text AND table_name = $2::text";

struct Session {
    database: String,
    client: Arc<Client>,
    driver: JoinHandle<()>,
}

pub struct PostgresSource {
    base_url: String,
    accept_invalid_certs: bool,
    session: Mutex<Option<Session>>,
}

impl PostgresSource {
    pub fn new(url: &str, accept_invalid_certs: bool) -> Result<Self> {
        validate_connection_string(url)?;
        Ok(Self {
            base_url: url.to_string(),
            accept_invalid_certs,
            session: Mutex::new(None),
        })
    }

    /// Connection to the database named in the base URL, used for catalog queries.
    async fn catalog_client(&self) -> Result<Arc<Client>> {
        let url = url::Url::parse(&self.base_url).context("Invalid connection string URL")?;
        let database = url.path().trim_start_matches('/').to_string();
        let database = if database.is_empty() {
            "postgres".to_string()
        } else {
            database
        };
        self.client_for(&database).await
    }

    async fn client_for(&self, database: &str) -> Result<Arc<Client>> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            if existing.database == database && !existing.client.is_closed() {
                return Ok(existing.client.clone());
            }
        }

        if let Some(previous) = session.take() {
            previous.driver.abort();
        }

        let url = replace_database_in_connection_string(&self.base_url, database)?;
        let (client, driver) = retry_with_backoff(
            || connect(&url, self.accept_invalid_certs),
            2,
            Duration::from_secs(1),
        )
        .await
        .with_context(|| {
            format!(
                "Failed to connect to {}",
                strip_password_from_url(&url).unwrap_or_else(|_| database.to_string())
            )
        })?;

        let client = Arc::new(client);
        *session = Some(Session {
            database: database.to_string(),
            client: client.clone(),
            driver,
        });
        Ok(client)
    }

    async fn columns(&self, client: &Client, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
        let rows = client
            .query(
                "SELECT column_name::text, data_type::text, character_maximum_length::int4,
                        numeric_precision::int4, numeric_scale::int4, is_nullable::text,
                        is_identity::text, column_default::text
                 FROM information_schema.columns
                 WHERE table_schema = $1::text AND table_name = $2::text
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get columns for {}.{}", schema, table))?;

        Ok(rows
            .iter()
            .map(|row| {
                let default: Option<String> = row.get(7);
                RawColumn {
                    name: row.get(0),
                    data_type: row.get(1),
                    max_length: row.get::<_, Option<i32>>(2).map(i64::from),
                    numeric_precision: row
                        .get::<_, Option<i32>>(3)
                        .and_then(|p| u32::try_from(p).ok()),
                    numeric_scale: row
                        .get::<_, Option<i32>>(4)
                        .and_then(|s| u32::try_from(s).ok()),
                    nullable: row.get::<_, String>(5) == "YES",
                    is_identity: row.get::<_, String>(6) == "YES"
                        || default.is_some_and(|d| d.starts_with("nextval(")),
                }
            })
            .collect())
    }

    async fn primary_key(&self, client: &Client, schema: &str, table: &str) -> Result<Vec<String>> {
        let rows = client
            .query(
                "SELECT a.attname::text
                 FROM pg_index i
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 JOIN pg_class c ON c.oid = i.indrelid
                 JOIN pg_namespace n ON n.oid = c.relnamespace
                 WHERE i.indisprimary
                   AND n.nspname = $1::text
                   AND c.relname = $2::text
                 ORDER BY array_position(i.indkey, a.attnum)",
                &[&schema, &table],
            )
            .await
            .with_context(|| format!("Failed to get primary key for {}.{}", schema, table))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn select_rows(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let client = self.client_for(db_name).await?;
        let (schema, table) = split_table_name(table_name);
        let columns = self.columns(&client, schema, table).await?;
        let kinds: Vec<ValueKind> = columns
            .iter()
            .map(|c| ValueKind::for_data_type(&c.data_type))
            .collect();

        let select_list = columns
            .iter()
            .zip(&kinds)
            .map(|(column, kind)| kind.select_expr(&column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT {} FROM {}.{}",
            select_list,
            quote_ident(schema),
            quote_ident(table)
        );

        let mut params: Vec<String> = Vec::new();
        if let Some(predicate) = build_where_clause(filters) {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.sql);
            params = predicate.params;
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        tracing::debug!("Reading {}.{} with {} filter parameter(s)", db_name, table_name, params.len());

        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client
            .query(sql.as_str(), &bound)
            .await
            .with_context(|| format!("Failed to read rows from {}.{}", db_name, table_name))?;

        rows.iter()
            .map(|pg_row| {
                let mut row = Row::with_capacity(columns.len());
                for (idx, (column, kind)) in columns.iter().zip(&kinds).enumerate() {
                    let cell = kind.read(pg_row, idx).with_context(|| {
                        format!("Failed to decode column {} of {}", column.name, table_name)
                    })?;
                    row.insert(column.name.clone(), cell);
                }
                Ok(row)
            })
            .collect()
    }
}

async fn connect(url: &str, accept_invalid_certs: bool) -> Result<(Client, JoinHandle<()>)> {
    // tokio-postgres reads sslmode from the URL; unset means prefer
    tracing::debug!(
        "Opening PostgreSQL connection (sslmode={})",
        ssl_mode(url).as_deref().unwrap_or("prefer")
    );
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .context("Failed to build TLS connector")?;
    let connector = MakeTlsConnector::new(tls);

    let (client, connection) = tokio_postgres::connect(url, connector)
        .await
        .context("Failed to open PostgreSQL connection")?;

    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!("PostgreSQL connection closed with error: {}", e);
        }
    });

    if let Err(e) = client.batch_execute(SESSION_SETUP_SQL).await {
        driver.abort();
        return Err(e).context("Failed to configure PostgreSQL session");
    }

    Ok((client, driver))
}

/// Split `schema.table`, defaulting to the public schema.
fn split_table_name(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => (schema, table),
        _ => (DEFAULT_SCHEMA, name),
    }
}

/// How a column is selected and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// Numeric and money, read through their text form so NaN and
    /// out-of-range values survive.
    Decimal,
    Date,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    Bytes,
    Text,
}

impl ValueKind {
    fn for_data_type(data_type: &str) -> Self {
        match data_type {
            "boolean" => ValueKind::Bool,
            "smallint" => ValueKind::Int2,
            "integer" => ValueKind::Int4,
            "bigint" => ValueKind::Int8,
            "real" => ValueKind::Float4,
            "double precision" => ValueKind::Float8,
            "numeric" | "money" => ValueKind::Decimal,
            "date" => ValueKind::Date,
            "timestamp without time zone" => ValueKind::Timestamp,
            "timestamp with time zone" => ValueKind::TimestampTz,
            "json" | "jsonb" => ValueKind::Json,
            "uuid" => ValueKind::Uuid,
            "bytea" => ValueKind::Bytes,
            _ => ValueKind::Text,
        }
    }

    fn select_expr(self, column: &str) -> String {
        let ident = quote_ident(column);
        match self {
            ValueKind::Decimal | ValueKind::Text => format!("{}::text AS {}", ident, ident),
            _ => ident,
        }
    }

    fn read(self, row: &tokio_postgres::Row, idx: usize) -> Result<Cell> {
        let cell = match self {
            ValueKind::Bool => row.try_get::<_, Option<bool>>(idx)?.map(Cell::Bool),
            ValueKind::Int2 => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| Cell::Int(i64::from(v))),
            ValueKind::Int4 => row
                .try_get::<_, Option<i32>>(idx)?
                .map(|v| Cell::Int(i64::from(v))),
            ValueKind::Int8 => row.try_get::<_, Option<i64>>(idx)?.map(Cell::Int),
            ValueKind::Float4 => row
                .try_get::<_, Option<f32>>(idx)?
                .map(|v| Cell::Float(f64::from(v))),
            ValueKind::Float8 => row.try_get::<_, Option<f64>>(idx)?.map(Cell::Float),
            ValueKind::Decimal => row.try_get::<_, Option<String>>(idx)?.map(Cell::Decimal),
            ValueKind::Date => row
                .try_get::<_, Option<chrono::NaiveDate>>(idx)?
                .map(Cell::Date),
            ValueKind::Timestamp => row
                .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
                .map(Cell::DateTime),
            ValueKind::TimestampTz => row
                .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
                .map(|v| Cell::DateTime(v.naive_utc())),
            ValueKind::Json => row
                .try_get::<_, Option<serde_json::Value>>(idx)?
                .map(|v| Cell::Text(v.to_string())),
            ValueKind::Uuid => row
                .try_get::<_, Option<uuid::Uuid>>(idx)?
                .map(|v| Cell::Text(v.to_string())),
            ValueKind::Bytes => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Cell::Binary),
            ValueKind::Text => row.try_get::<_, Option<String>>(idx)?.map(Cell::Text),
        };
        Ok(cell.unwrap_or(Cell::Null))
    }
}

#[async_trait]
impl SourceProvider for PostgresSource {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let client = self.catalog_client().await?;
        let rows = client
            .query(
                "SELECT datname::text FROM pg_database
                 WHERE NOT datistemplate AND datallowconn
                 ORDER BY datname",
                &[],
            )
            .await
            .context("Failed to list databases")?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn list_tables(&self, db_name: &str) -> Result<Vec<String>> {
        let client = self.client_for(db_name).await?;
        let rows = client
            .query(
                "SELECT table_schema::text, table_name::text
                 FROM information_schema.tables
                 WHERE table_type = 'BASE TABLE'
                   AND table_schema NOT IN ('pg_catalog', 'information_schema')
                 ORDER BY table_schema, table_name",
                &[],
            )
            .await
            .with_context(|| format!("Failed to list tables in {}", db_name))?;

        Ok(rows
            .iter()
            .map(|row| {
                let schema: String = row.get(0);
                let table: String = row.get(1);
                if schema == DEFAULT_SCHEMA {
                    table
                } else {
                    format!("{}.{}", schema, table)
                }
            })
            .collect())
    }

    async fn database_exists(&self, db_name: &str) -> Result<bool> {
        let client = self.catalog_client().await?;
        let row = client
            .query_opt("SELECT 1 FROM pg_database WHERE datname = $1::text", &[&db_name])
            .await
            .with_context(|| format!("Failed to check database {}", db_name))?;
        Ok(row.is_some())
    }

    async fn table_exists(&self, db_name: &str, table_name: &str) -> Result<bool> {
        let client = self.client_for(db_name).await?;
        let (schema, table) = split_table_name(table_name);
        let row = client
            .query_opt(TABLE_EXISTS_SQL, &[&schema, &table])
            .await
            .with_context(|| format!("Failed to check table {}", table_name))?;
        Ok(row.is_some())
    }

    async fn get_table_schema(&self, db_name: &str, table_name: &str) -> Result<RawTableSchema> {
        let client = self.client_for(db_name).await?;
        let (schema, table) = split_table_name(table_name);
        let columns = self.columns(&client, schema, table).await?;
        let key_columns = self.primary_key(&client, schema, table).await?;
        Ok(RawTableSchema {
            columns,
            key_columns,
        })
    }

    async fn get_table_data(
        &self,
        db_name: &str,
        table_name: &str,
        filters: &[FilterPredicate],
    ) -> Result<Vec<Row>> {
        self.select_rows(db_name, table_name, filters, None).await
    }

    async fn get_table_preview(
        &self,
        db_name: &str,
        table_name: &str,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.select_rows(db_name, table_name, &[], Some(limit)).await
    }

    async fn close(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            tracing::debug!("Closing source session for {}", session.database);
            drop(session.client);
            session.driver.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_table_name() {
        assert_eq!(split_table_name("orders"), ("public", "orders"));
        assert_eq!(split_table_name("sales.orders"), ("sales", "orders"));
        assert_eq!(split_table_name(".orders"), ("public", ".orders"));
    }

    #[test]
    fn test_table_exists_only_matches_base_tables() {
        assert!(TABLE_EXISTS_SQL.contains("table_type = 'BASE TABLE'"));
    }

    #[test]
    fn test_session_renders_timestamps_in_utc() {
        assert!(SESSION_SETUP_SQL.contains("SET TIME ZONE 'UTC'"));
        assert!(SESSION_SETUP_SQL.contains("DateStyle TO 'ISO, YMD'"));
    }

    #[test]
    fn test_value_kind_mapping() {
        assert_eq!(ValueKind::for_data_type("integer"), ValueKind::Int4);
        assert_eq!(ValueKind::for_data_type("numeric"), ValueKind::Decimal);
        assert_eq!(
            ValueKind::for_data_type("timestamp with time zone"),
            ValueKind::TimestampTz
        );
        assert_eq!(ValueKind::for_data_type("interval"), ValueKind::Text);
        assert_eq!(
            ValueKind::for_data_type("time without time zone"),
            ValueKind::Text
        );
    }

    #[test]
    fn test_select_expr_casts_text_kinds() {
        assert_eq!(ValueKind::Int4.select_expr("id"), "\"id\"");
        assert_eq!(
            ValueKind::Decimal.select_expr("total"),
            "\"total\"::text AS \"total\""
        );
        assert_eq!(
            ValueKind::Text.select_expr("we\"ird"),
            "\"we\"\"ird\"::text AS \"we\"\"ird\""
        );
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(PostgresSource::new("mysql://localhost/db", false).is_err());
        assert!(PostgresSource::new("postgresql://user@localhost/db", true).is_ok());
    }
}
