// ABOUTME: Bounded, newest-first audit log of table sync outcomes
// ABOUTME: Shared by manual syncs and scheduled runs; appends are serialized in-process

use crate::store::{self, DocumentStore, LOGS_DOC};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default cap on stored entries.
pub const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
}

/// One recorded sync outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub db_name: String,
    pub table_name: String,
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced: Option<u64>,
}

/// An outcome waiting to be recorded. The log assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub db_name: String,
    pub table_name: String,
    pub status: SyncStatus,
    pub message: Option<String>,
    pub synced: Option<u64>,
}

impl NewLogEntry {
    pub fn success(db_name: &str, table_name: &str, message: String, synced: u64) -> Self {
        Self {
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
            status: SyncStatus::Success,
            message: Some(message),
            synced: Some(synced),
        }
    }

    pub fn failure(db_name: &str, table_name: &str, message: String, synced: u64) -> Self {
        Self {
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
            status: SyncStatus::Error,
            message: Some(message),
            synced: Some(synced),
        }
    }
}

pub struct AuditLog {
    store: Arc<dyn DocumentStore>,
    max_entries: usize,
    append_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn DocumentStore>, max_entries: usize) -> Self {
        Self {
            store,
            max_entries: max_entries.max(1),
            append_lock: Mutex::new(()),
        }
    }

    /// Record an outcome, evicting the oldest entries beyond the cap.
    pub async fn append(&self, entry: NewLogEntry) -> Result<SyncLogEntry> {
        let _guard = self.append_lock.lock().await;

        let stored = SyncLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            db_name: entry.db_name,
            table_name: entry.table_name,
            status: entry.status,
            message: entry.message,
            synced: entry.synced,
        };

        let mut entries = self.read().await;
        entries.insert(0, stored.clone());
        entries.truncate(self.max_entries);
        store::save_json(self.store.as_ref(), LOGS_DOC, &entries).await?;

        Ok(stored)
    }

    /// Every stored entry, newest first.
    pub async fn load_all(&self) -> Vec<SyncLogEntry> {
        self.read().await
    }

    async fn read(&self) -> Vec<SyncLogEntry> {
        store::load_json(self.store.as_ref(), LOGS_DOC)
            .await
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn log(max: usize) -> (Arc<MemoryStore>, AuditLog) {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditLog::new(store.clone(), max);
        (store, audit)
    }

    #[tokio::test]
    async fn test_append_prepends_and_assigns_ids() {
        let (_, audit) = log(MAX_LOG_ENTRIES);
        let first = audit
            .append(NewLogEntry::success("db", "a", "ok".into(), 3))
            .await
            .unwrap();
        let second = audit
            .append(NewLogEntry::failure("db", "b", "boom".into(), 0))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        let entries = audit.load_all().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].table_name, "b");
        assert_eq!(entries[0].status, SyncStatus::Error);
        assert_eq!(entries[1].table_name, "a");
        assert!(entries[0].timestamp >= entries[1].timestamp);
    }

    #[tokio::test]
    async fn test_log_is_bounded() {
        let (_, audit) = log(5);
        for i in 0..12 {
            audit
                .append(NewLogEntry::success("db", &format!("t{}", i), "ok".into(), i))
                .await
                .unwrap();
        }
        let entries = audit.load_all().await;
        assert_eq!(entries.len(), 5);
        let tables: Vec<&str> = entries.iter().map(|e| e.table_name.as_str()).collect();
        assert_eq!(tables, vec!["t11", "t10", "t9", "t8", "t7"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let (_, audit) = log(MAX_LOG_ENTRIES);
        let audit = Arc::new(audit);
        let mut handles = Vec::new();
        for i in 0..20 {
            let audit = audit.clone();
            handles.push(tokio::spawn(async move {
                audit
                    .append(NewLogEntry::success("db", &format!("t{}", i), "ok".into(), 1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(audit.load_all().await.len(), 20);
    }

    #[tokio::test]
    async fn test_corrupt_log_reads_as_empty() {
        let (store, audit) = log(MAX_LOG_ENTRIES);
        store
            .put(LOGS_DOC, serde_json::json!("garbage"))
            .await
            .unwrap();
        assert!(audit.load_all().await.is_empty());

        audit
            .append(NewLogEntry::success("db", "t", "ok".into(), 1))
            .await
            .unwrap();
        assert_eq!(audit.load_all().await.len(), 1);
    }

    #[test]
    fn test_entry_wire_shape() {
        let entry = SyncLogEntry {
            id: Uuid::nil(),
            timestamp: DateTime::parse_from_rfc3339("2024-01-05T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            db_name: "sales".into(),
            table_name: "orders".into(),
            status: SyncStatus::Success,
            message: Some("Synced 2 rows for table \"orders\".".into()),
            synced: Some(2),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["dbName"], "sales");
        assert_eq!(value["tableName"], "orders");
        assert_eq!(value["status"], "success");
        assert_eq!(value["synced"], 2);
        assert_eq!(value["timestamp"], "2024-01-05T10:00:00Z");
    }
}
