// ABOUTME: Persisted per-table row filters keyed by "<db>_<table>"
// ABOUTME: An empty filter list removes the entry so absence always means "no filtering"

use crate::filter::FilterPredicate;
use crate::store::{self, DocumentStore, FILTERS_DOC};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type FilterMap = BTreeMap<String, Vec<FilterPredicate>>;

pub struct FilterStore {
    store: Arc<dyn DocumentStore>,
    write_lock: Mutex<()>,
}

/// Storage key for a table's filters.
pub fn filter_key(db_name: &str, table_name: &str) -> String {
    format!("{}_{}", db_name.trim(), table_name.trim())
}

impl FilterStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, db_name: &str, table_name: &str) -> Vec<FilterPredicate> {
        self.read()
            .await
            .remove(&filter_key(db_name, table_name))
            .unwrap_or_default()
    }

    pub async fn set(
        &self,
        db_name: &str,
        table_name: &str,
        filters: Vec<FilterPredicate>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read().await;
        let key = filter_key(db_name, table_name);

        if filters.is_empty() {
            all.remove(&key);
        } else {
            all.insert(key, filters);
        }

        store::save_json(self.store.as_ref(), FILTERS_DOC, &all).await
    }

    pub async fn clear(&self, db_name: &str, table_name: &str) -> Result<()> {
        self.set(db_name, table_name, Vec::new()).await
    }

    async fn read(&self) -> FilterMap {
        store::load_json(self.store.as_ref(), FILTERS_DOC)
            .await
            .unwrap_or_default()
    }
}
