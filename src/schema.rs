// ABOUTME: Translates source column metadata into destination-safe column definitions
// ABOUTME: Enforces the destination's row-size budget by demoting wide VARCHARs to TEXT

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Default destination row-size ceiling in bytes.
pub const DEFAULT_ROW_BUDGET_BYTES: usize = 65_535;
/// Longest character column kept inline as VARCHAR.
pub const DEFAULT_INLINE_TEXT_THRESHOLD: u32 = 4_000;
/// Worst-case encoded width of one character (utf8mb4).
pub const DEFAULT_BYTES_PER_CHAR: usize = 4;

/// In-row bytes a TEXT column costs (length prefix + pointer, data stored off-row).
const TEXT_COST: usize = 12;
const INT_COST: usize = 4;
const BIGINT_COST: usize = 8;
const DECIMAL_COST: usize = 16;
const DATETIME_COST: usize = 8;

/// Column metadata as reported by the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    /// Declared character length; `-1` means unbounded (`MAX`).
    #[serde(default)]
    pub max_length: Option<i64>,
    #[serde(default)]
    pub numeric_precision: Option<u32>,
    #[serde(default)]
    pub numeric_scale: Option<u32>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub is_identity: bool,
}

fn default_nullable() -> bool {
    true
}

impl RawColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            nullable: true,
            is_identity: false,
        }
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }
}

/// Source table metadata: ordered columns plus declared key columns in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTableSchema {
    pub columns: Vec<RawColumn>,
    #[serde(default)]
    pub key_columns: Vec<String>,
}

/// Destination column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestType {
    Int,
    BigInt,
    Decimal { precision: u32, scale: u32 },
    Varchar(u32),
    Text,
    DateTime,
}

impl fmt::Display for DestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestType::Int => write!(f, "INT"),
            DestType::BigInt => write!(f, "BIGINT"),
            DestType::Decimal { precision, scale } => write!(f, "DECIMAL({},{})", precision, scale),
            DestType::Varchar(len) => write!(f, "VARCHAR({})", len),
            DestType::Text => write!(f, "TEXT"),
            DestType::DateTime => write!(f, "DATETIME"),
        }
    }
}

impl Serialize for DestType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One entry of the `table_config` sent to the ingestion API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: DestType,
    #[serde(rename = "primaryKey")]
    pub is_key: bool,
    #[serde(rename = "autoIncrement")]
    pub auto_increment: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDefinition>,
    pub unique_keys: Vec<String>,
}

/// Destination limits the translation has to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaLimits {
    pub row_budget_bytes: usize,
    pub inline_text_threshold: u32,
    pub bytes_per_char: usize,
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self {
            row_budget_bytes: DEFAULT_ROW_BUDGET_BYTES,
            inline_text_threshold: DEFAULT_INLINE_TEXT_THRESHOLD,
            bytes_per_char: DEFAULT_BYTES_PER_CHAR,
        }
    }
}

/// Map a source column to its destination type.
pub fn map_type(column: &RawColumn, limits: &SchemaLimits) -> DestType {
    let data_type = column.data_type.trim().to_ascii_lowercase();

    match data_type.as_str() {
        "int" | "integer" | "int4" | "smallint" | "int2" | "tinyint" | "bit" | "boolean"
        | "bool" => DestType::Int,
        "bigint" | "int8" => DestType::BigInt,
        "decimal" | "numeric" => DestType::Decimal {
            precision: column.numeric_precision.filter(|p| *p > 0).unwrap_or(18),
            scale: column.numeric_scale.unwrap_or(0),
        },
        "money" | "smallmoney" => DestType::Decimal {
            precision: 19,
            scale: 4,
        },
        "float" | "real" | "double precision" | "float4" | "float8" => DestType::Decimal {
            precision: 18,
            scale: 6,
        },
        "varchar" | "nvarchar" | "character varying" => {
            character_type(column.max_length, true, limits)
        }
        "char" | "nchar" | "character" | "bpchar" => {
            character_type(column.max_length, false, limits)
        }
        "text" | "ntext" | "json" | "jsonb" | "xml" => DestType::Text,
        "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => {
            DestType::DateTime
        }
        t if t.starts_with("timestamp") => DestType::DateTime,
        t if t.starts_with("time") => DestType::Varchar(50),
        "uniqueidentifier" | "uuid" => DestType::Varchar(36),
        "binary" | "varbinary" | "image" | "bytea" => DestType::Varchar(255),
        _ => DestType::Varchar(255),
    }
}

fn character_type(max_length: Option<i64>, varying: bool, limits: &SchemaLimits) -> DestType {
    match max_length {
        Some(-1) => DestType::Text,
        None if varying => DestType::Text,
        Some(len) if len > i64::from(limits.inline_text_threshold) => DestType::Text,
        Some(len) if len > 0 => DestType::Varchar(len as u32),
        _ => DestType::Varchar(255),
    }
}

/// Estimated in-row bytes of one column.
pub fn column_cost(column_type: DestType, limits: &SchemaLimits) -> usize {
    match column_type {
        DestType::Text => TEXT_COST,
        DestType::Varchar(len) => len as usize * limits.bytes_per_char,
        DestType::Int => INT_COST,
        DestType::BigInt => BIGINT_COST,
        DestType::Decimal { .. } => DECIMAL_COST,
        DestType::DateTime => DATETIME_COST,
    }
}

/// Estimated in-row bytes of a full row.
pub fn row_cost(columns: &[ColumnDefinition], limits: &SchemaLimits) -> usize {
    columns
        .iter()
        .map(|c| column_cost(c.column_type, limits))
        .sum()
}

/// Demote the widest VARCHAR columns to TEXT until the row fits the budget.
///
/// Greedy largest-first, ties broken by column order, which yields the fewest
/// conversions. Returns the names of converted columns in conversion order.
/// A row that still does not fit after every VARCHAR is converted is left as is.
pub fn enforce_row_budget(columns: &mut [ColumnDefinition], limits: &SchemaLimits) -> Vec<String> {
    let mut converted = Vec::new();
    let mut total = row_cost(columns, limits);

    while total > limits.row_budget_bytes {
        let mut widest: Option<(usize, u32)> = None;
        for (idx, column) in columns.iter().enumerate() {
            if let DestType::Varchar(len) = column.column_type {
                if widest.map_or(true, |(_, best)| len > best) {
                    widest = Some((idx, len));
                }
            }
        }

        let Some((idx, _)) = widest else {
            break;
        };

        let before = column_cost(columns[idx].column_type, limits);
        columns[idx].column_type = DestType::Text;
        total = total - before + TEXT_COST;
        converted.push(columns[idx].name.clone());
    }

    converted
}

/// Produce the destination schema for a source table.
///
/// Fails only when the table has no columns, since then no key can be derived.
pub fn translate(raw: &RawTableSchema, limits: &SchemaLimits) -> SyncResult<TableSchema> {
    let first_column = raw.columns.first().ok_or_else(|| {
        SyncError::Schema(
            "Table has no primary key and no columns; cannot determine unique_keys.".to_string(),
        )
    })?;

    let key_columns: Vec<&str> = raw
        .key_columns
        .iter()
        .map(String::as_str)
        .filter(|key| raw.columns.iter().any(|c| c.name == *key))
        .collect();
    let first_key = key_columns.first().copied();

    let mut columns: Vec<ColumnDefinition> = raw
        .columns
        .iter()
        .map(|column| {
            let is_key = key_columns.contains(&column.name.as_str());
            ColumnDefinition {
                name: column.name.clone(),
                column_type: map_type(column, limits),
                is_key,
                auto_increment: column.is_identity && first_key == Some(column.name.as_str()),
                nullable: column.nullable && !is_key,
            }
        })
        .collect();

    let converted = enforce_row_budget(&mut columns, limits);
    if !converted.is_empty() {
        tracing::warn!(
            "Row size exceeded {} bytes; stored {} column(s) as TEXT: {}",
            limits.row_budget_bytes,
            converted.len(),
            converted.join(", ")
        );
    }

    let unique_keys = if key_columns.is_empty() {
        vec![first_column.name.clone()]
    } else {
        key_columns.iter().map(|k| k.to_string()).collect()
    };

    Ok(TableSchema {
        columns,
        unique_keys,
    })
}
