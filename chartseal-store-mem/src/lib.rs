//! In-memory record store for `chartseal`.
//!
//! Backs development setups and the integration test suite. Documents live
//! in per-collection vectors in creation order; unique constraints are
//! declared per column and enforced on insert, mirroring how a database
//! backend would reject the loser of a racing write.

#![warn(clippy::pedantic, clippy::nursery)]

use async_trait::async_trait;
use chartseal::error::StoreError;
use chartseal::lookup::Filter;
use chartseal::store::{Document, FindOptions, Record, RecordId, RecordStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory [`RecordStore`] with declared unique columns.
///
/// # Example
///
/// ```rust,ignore
/// use chartseal_store_mem::MemoryStore;
///
/// let store = MemoryStore::new()
///     .with_unique("users", "HospitalIDHash")
///     .with_unique("patients", "HospitalIDHash");
/// ```
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    unique: Vec<(String, String)>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store with no constraints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            unique: Vec::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Declares a unique constraint on a column.
    ///
    /// Constraints apply to non-null values only (sparse, like the
    /// original schema's surrogate indexes).
    #[must_use]
    pub fn with_unique(mut self, collection: &str, column: &str) -> Self {
        self.unique.push((collection.to_string(), column.to_string()));
        self
    }

    /// A store preconfigured with the medical-records constraints:
    /// surrogate-layer uniqueness of the hospital identifier for accounts
    /// and charts.
    #[must_use]
    pub fn with_record_constraints() -> Self {
        Self::new()
            .with_unique("users", "HospitalIDHash")
            .with_unique("patients", "HospitalIDHash")
    }

    /// Number of records in a collection (test convenience).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.lock().unwrap().get(collection).map_or(0, Vec::len)
    }

    /// True when a collection holds no records.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn unique_columns<'a>(&'a self, collection: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.unique
            .iter()
            .filter(move |(candidate, _)| candidate.as_str() == collection)
            .map(|(_, column)| column.as_str())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, collection: &str, document: Document) -> Result<RecordId, StoreError> {
        let mut collections =
            self.collections.lock().map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let records = collections.entry(collection.to_string()).or_default();

        for column in self.unique_columns(collection) {
            let Some(value) = document.get(column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if records.iter().any(|record| record.document.get(column) == Some(value)) {
                return Err(StoreError::UniqueViolation {
                    collection: collection.to_string(),
                    column: column.to_string(),
                });
            }
        }

        let id = RecordId::new(format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        records.push(Record { id: id.clone(), document });
        Ok(id)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Record>, StoreError> {
        let collections =
            self.collections.lock().map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        Ok(collections
            .get(collection)
            .and_then(|records| records.iter().find(|record| filter.matches(&record.document)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        options: FindOptions,
    ) -> Result<Vec<Record>, StoreError> {
        let collections =
            self.collections.lock().map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let mut matched: Vec<Record> = collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| filter.map_or(true, |f| f.matches(&record.document)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if options.newest_first {
            matched.reverse();
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update(
        &self,
        collection: &str,
        id: &RecordId,
        changes: Document,
    ) -> Result<bool, StoreError> {
        let mut collections =
            self.collections.lock().map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|record| &record.id == id))
        else {
            return Ok(false);
        };

        for (column, value) in changes {
            if value == Value::Null {
                record.document.remove(&column);
            } else {
                record.document.insert(column, value);
            }
        }
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> Result<bool, StoreError> {
        let mut collections =
            self.collections.lock().map_err(|_| StoreError::Backend("lock poisoned".into()))?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|record| &record.id != id);
        Ok(records.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryStore::new();
        let id = store
            .insert("users", doc(&[("HospitalIDHash", json!("abc"))]))
            .await
            .expect("insert");

        let found = store
            .find_one("users", &Filter::eq("HospitalIDHash", "abc"))
            .await
            .expect("find")
            .expect("record");
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_duplicates() {
        let store = MemoryStore::new().with_unique("users", "HospitalIDHash");
        store.insert("users", doc(&[("HospitalIDHash", json!("dup"))])).await.expect("first");

        let result = store.insert("users", doc(&[("HospitalIDHash", json!("dup"))])).await;
        assert!(matches!(
            result,
            Err(StoreError::UniqueViolation { ref column, .. }) if column == "HospitalIDHash"
        ));
    }

    #[tokio::test]
    async fn test_unique_constraint_is_sparse() {
        let store = MemoryStore::new().with_unique("users", "HospitalIDHash");
        store.insert("users", doc(&[("name", json!("a"))])).await.expect("first");
        store.insert("users", doc(&[("name", json!("b"))])).await.expect("second");
        assert_eq!(store.len("users"), 2);
    }

    #[tokio::test]
    async fn test_find_many_ordering_and_limit() {
        let store = MemoryStore::new();
        for n in 0..5 {
            store.insert("logs", doc(&[("n", json!(n))])).await.expect("insert");
        }

        let newest = store
            .find_many("logs", None, FindOptions { limit: Some(2), newest_first: true })
            .await
            .expect("find");
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].document.get("n"), Some(&json!(4)));
        assert_eq!(newest[1].document.get("n"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_update_merges_and_removes() {
        let store = MemoryStore::new();
        let id = store
            .insert("users", doc(&[("a", json!(1)), ("b", json!(2))]))
            .await
            .expect("insert");

        let found = store
            .update("users", &id, doc(&[("a", Value::Null), ("c", json!(3))]))
            .await
            .expect("update");
        assert!(found);

        let record = store
            .find_one("users", &Filter::eq("c", 3))
            .await
            .expect("find")
            .expect("record");
        assert!(!record.document.contains_key("a"));
        assert_eq!(record.document.get("b"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_update_unknown_record() {
        let store = MemoryStore::new();
        let found = store
            .update("users", &RecordId::new("rec-404"), doc(&[("a", json!(1))]))
            .await
            .expect("update");
        assert!(!found);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let id = store.insert("users", doc(&[("a", json!(1))])).await.expect("insert");
        assert!(store.delete("users", &id).await.expect("delete"));
        assert!(!store.delete("users", &id).await.expect("second delete"));
        assert!(store.is_empty("users"));
    }
}
