// ABOUTME: Command implementations for the CLI
// ABOUTME: Shared AppContext wires configuration to stores, source, ingest client and scheduler

pub mod browse;
pub mod filters;
pub mod logs;
pub mod run;
pub mod schedule;
pub mod sync;

use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::filter_store::FilterStore;
use crate::ingest::HttpIngestClient;
use crate::replicator::Replicator;
use crate::scheduler::Scheduler;
use crate::source::{open_source, SourceProvider};
use crate::store::{DocumentStore, FileStore};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Everything a command needs, built once from configuration.
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub audit: Arc<AuditLog>,
    pub filters: Arc<FilterStore>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        tracing::debug!("Using data directory {}", data_dir.display());
        let store: Arc<dyn DocumentStore> = Arc::new(FileStore::new(data_dir));
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        let audit = Arc::new(AuditLog::new(store.clone(), config.audit.max_entries));
        let filters = Arc::new(FilterStore::new(store.clone()));
        Self {
            config,
            store,
            audit,
            filters,
        }
    }

    pub async fn source(&self) -> Result<Arc<dyn SourceProvider>> {
        self.config.validate()?;
        open_source(&self.config.source).await
    }

    pub async fn replicator(&self) -> Result<Arc<Replicator>> {
        self.config.validate_for_sync()?;
        let source = open_source(&self.config.source).await?;
        let base_url = self
            .config
            .ingest
            .base_url
            .as_deref()
            .context("ingest.base_url is required to sync")?;
        let ingest = HttpIngestClient::new(
            base_url,
            &self.config.ingest.sync_path,
            self.config.ingest.api_key.clone(),
            self.config.ingest_timeout(),
        )?;
        tracing::debug!("Sending batches to {}", ingest.endpoint());

        Ok(Arc::new(Replicator::new(
            source,
            Arc::new(ingest),
            self.config.effective_batch_size(),
            self.config.schema_limits(),
        )))
    }

    pub async fn scheduler(&self) -> Result<Scheduler> {
        let replicator = self.replicator().await?;
        Ok(Scheduler::new(
            self.store.clone(),
            self.audit.clone(),
            self.filters.clone(),
            replicator,
        ))
    }
}
