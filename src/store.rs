// ABOUTME: Durable whole-document key-value store for schedule, log and filter state
// ABOUTME: File-backed store writes atomically; in-memory store backs tests and dry runs

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;

/// Document holding the recurring schedule.
pub const SCHEDULE_DOC: &str = "schedule";
/// Document holding the bounded audit log.
pub const LOGS_DOC: &str = "logs";
/// Document holding per-table filters.
pub const FILTERS_DOC: &str = "filters";

/// Whole-document storage. Each key holds one JSON value which is always read
/// and replaced in full.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Read and decode a document, treating unreadable or malformed content as absent.
pub async fn load_json<T: DeserializeOwned>(store: &dyn DocumentStore, key: &str) -> Option<T> {
    let value = match store.get(key).await {
        Ok(Some(value)) => value,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Failed to read stored document '{}': {:#}", key, e);
            return None;
        }
    };

    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!("Ignoring malformed stored document '{}': {}", key, e);
            None
        }
    }
}

/// Encode and store a document.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn DocumentStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)
        .with_context(|| format!("Failed to serialize document '{}'", key))?;
    store.put(key, value).await
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("Invalid document key '{}'", key);
    }
    Ok(())
}

/// Stores each document as `<key>.json` under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create directory {}", self.dir.display()))?;

        let contents =
            serde_json::to_vec_pretty(&value).context("Failed to serialize document")?;
        let dir = self.dir.clone();

        // Write to a sibling temp file then rename so readers never see a partial document
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
            tmp.write_all(&contents)
                .context("Failed to write temp document")?;
            tmp.as_file().sync_all().context("Failed to flush temp document")?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Document write task panicked")?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        validate_key(key)?;
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        validate_key(key)?;
        self.docs.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.docs.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_round_trip_and_delete() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get(SCHEDULE_DOC).await.unwrap(), None);

        store
            .put(SCHEDULE_DOC, json!({"cronExpression": "*/5 * * * *"}))
            .await
            .unwrap();
        assert!(dir.path().join("nested/schedule.json").exists());
        assert_eq!(
            store.get(SCHEDULE_DOC).await.unwrap(),
            Some(json!({"cronExpression": "*/5 * * * *"}))
        );

        store.delete(SCHEDULE_DOC).await.unwrap();
        assert_eq!(store.get(SCHEDULE_DOC).await.unwrap(), None);
        // Deleting a missing document is not an error
        store.delete(SCHEDULE_DOC).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_overwrites_whole_document() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put(LOGS_DOC, json!([1, 2, 3])).await.unwrap();
        store.put(LOGS_DOC, json!([4])).await.unwrap();
        assert_eq!(store.get(LOGS_DOC).await.unwrap(), Some(json!([4])));
    }

    #[tokio::test]
    async fn test_corrupt_document_loads_as_absent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("filters.json"), "{not json").unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.get(FILTERS_DOC).await.is_err());
        let loaded: Option<serde_json::Value> = load_json(&store, FILTERS_DOC).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_wrong_shape_loads_as_absent() {
        let store = MemoryStore::new();
        store.put(LOGS_DOC, json!({"not": "a list"})).await.unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, LOGS_DOC).await;
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.put("../escape", json!(1)).await.is_err());
        assert!(MemoryStore::new().get("").await.is_err());
    }

    #[tokio::test]
    async fn test_save_json_helper() {
        let store = MemoryStore::new();
        save_json(&store, FILTERS_DOC, &vec!["a", "b"]).await.unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, FILTERS_DOC).await;
        assert_eq!(loaded, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
