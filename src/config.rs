// ABOUTME: Application configuration loaded from TOML with environment/flag overrides
// ABOUTME: Covers source, ingestion endpoint, batching, schema limits and audit retention

use crate::audit::MAX_LOG_ENTRIES;
use crate::ingest::{DEFAULT_SYNC_PATH, DEFAULT_TIMEOUT_SECS};
use crate::schema::{
    SchemaLimits, DEFAULT_BYTES_PER_CHAR, DEFAULT_INLINE_TEXT_THRESHOLD, DEFAULT_ROW_BUDGET_BYTES,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when no explicit path is given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "replicator.toml";
const DEFAULT_DATA_DIR: &str = ".cron-replicator";
const DEFAULT_BATCH_SIZE: usize = 5000;
const DEFAULT_DEV_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    /// Small batches so the chunking path is exercised against real data.
    Development,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Postgres,
    Fixture,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub url: Option<String>,
    pub fixture_path: Option<PathBuf>,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub base_url: Option<String>,
    pub sync_path: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            sync_path: DEFAULT_SYNC_PATH.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub dev_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dev_batch_size: DEFAULT_DEV_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub row_budget_bytes: usize,
    pub inline_text_threshold: u32,
    pub bytes_per_char: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            row_budget_bytes: DEFAULT_ROW_BUDGET_BYTES,
            inline_text_threshold: DEFAULT_INLINE_TEXT_THRESHOLD,
            bytes_per_char: DEFAULT_BYTES_PER_CHAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: MAX_LOG_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: Mode,
    pub data_dir: Option<PathBuf>,
    pub source: SourceConfig,
    pub ingest: IngestConfig,
    pub sync: SyncConfig,
    pub schema: SchemaConfig,
    pub audit: AuditConfig,
}

/// Values supplied on the command line or through the environment. Each one
/// that is set replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub mode: Option<Mode>,
    pub data_dir: Option<PathBuf>,
    pub source_kind: Option<SourceKind>,
    pub source_url: Option<String>,
    pub fixture_path: Option<PathBuf>,
    pub ingest_base_url: Option<String>,
    pub ingest_api_key: Option<String>,
    pub batch_size: Option<usize>,
}

impl AppConfig {
    /// Load configuration from `path`, or from `replicator.toml` in the
    /// working directory when present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    tracing::debug!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid configuration")
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(dir) = overrides.data_dir {
            self.data_dir = Some(dir);
        }
        if let Some(kind) = overrides.source_kind {
            self.source.kind = kind;
        }
        if let Some(url) = overrides.source_url {
            self.source.url = Some(url);
        }
        if let Some(path) = overrides.fixture_path {
            self.source.fixture_path = Some(path);
        }
        if let Some(url) = overrides.ingest_base_url {
            self.ingest.base_url = Some(url);
        }
        if let Some(key) = overrides.ingest_api_key {
            self.ingest.api_key = Some(key);
        }
        if let Some(size) = overrides.batch_size {
            self.sync.batch_size = size;
        }
    }

    /// Check everything needed to read from the source.
    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            bail!("sync.batch_size must be greater than zero");
        }
        if self.sync.dev_batch_size == 0 {
            bail!("sync.dev_batch_size must be greater than zero");
        }
        if self.schema.bytes_per_char == 0 {
            bail!("schema.bytes_per_char must be greater than zero");
        }

        match self.source.kind {
            SourceKind::Postgres => {
                let url = self.source.url.as_deref().unwrap_or_default();
                if url.trim().is_empty() {
                    bail!(
                        "source.url is required for the postgres source.\n\
                         Set it in {} or with SOURCE_DATABASE_URL",
                        DEFAULT_CONFIG_FILE
                    );
                }
                crate::utils::validate_connection_string(url)?;
            }
            SourceKind::Fixture => {
                if self.source.fixture_path.is_none() {
                    bail!("source.fixture_path is required for the fixture source");
                }
            }
        }
        Ok(())
    }

    /// Check everything needed to send batches as well.
    pub fn validate_for_sync(&self) -> Result<()> {
        self.validate()?;
        let base = self.ingest.base_url.as_deref().unwrap_or_default();
        if base.trim().is_empty() {
            bail!(
                "ingest.base_url is required to sync.\n\
                 Set it in {} or with INGEST_BASE_URL",
                DEFAULT_CONFIG_FILE
            );
        }
        url::Url::parse(base).with_context(|| format!("Invalid ingest.base_url: {}", base))?;
        if self.ingest.timeout_secs == 0 {
            bail!("ingest.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Rows per transmitted batch for the current mode.
    pub fn effective_batch_size(&self) -> usize {
        match self.mode {
            Mode::Development => self.sync.dev_batch_size,
            Mode::Production => self.sync.batch_size,
        }
    }

    pub fn schema_limits(&self) -> SchemaLimits {
        SchemaLimits {
            row_budget_bytes: self.schema.row_budget_bytes,
            inline_text_threshold: self.schema.inline_text_threshold,
            bytes_per_char: self.schema.bytes_per_char,
        }
    }

    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.timeout_secs)
    }

    /// Directory holding schedule, logs and filters.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(DEFAULT_DATA_DIR))
    }
}
