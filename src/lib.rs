// ABOUTME: Library root for cron-replicator
// ABOUTME: Scheduled replication of source tables to an HTTP ingestion endpoint

pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod filter_store;
pub mod ingest;
pub mod replicator;
pub mod row;
pub mod scheduler;
pub mod schema;
pub mod source;
pub mod store;
pub mod utils;

pub use error::{SyncError, SyncResult};
