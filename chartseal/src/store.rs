//! Persistence collaborator abstraction.
//!
//! The core never talks to a database directly; it hands documents and
//! disjunctive filters to a [`RecordStore`] implementation. Uniqueness is
//! the store's job: two concurrent writers racing on the same surrogate
//! both attempt the insert and the loser receives
//! [`StoreError::UniqueViolation`](crate::error::StoreError::UniqueViolation).
//!
//! Implementations must be thread-safe (`Send + Sync`) to support
//! concurrent requests and detached audit writes.

use crate::error::StoreError;
use crate::lookup::Filter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A stored document: string columns to JSON values.
pub type Document = serde_json::Map<String, Value>;

/// Opaque record identifier assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps a backend-assigned identifier.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched record: identifier plus document.
#[derive(Debug, Clone)]
pub struct Record {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// The stored columns.
    pub document: Document,
}

/// Listing options for [`RecordStore::find_many`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Return records in reverse creation order.
    pub newest_first: bool,
}

/// Document store operations consumed by the core.
///
/// Update semantics: `changes` is merged column-by-column into the stored
/// document; a `null` value removes the column. Updates never fail on a
/// missing column.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a document, enforcing any declared unique constraints.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UniqueViolation` when a constrained column
    /// collides with an existing record.
    async fn insert(&self, collection: &str, document: Document) -> Result<RecordId, StoreError>;

    /// Finds the first record matching the filter.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the query cannot be evaluated.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Record>, StoreError>;

    /// Lists records, optionally filtered, in creation order.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the query cannot be evaluated.
    async fn find_many(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        options: FindOptions,
    ) -> Result<Vec<Record>, StoreError>;

    /// Merges column changes into a record (`null` removes the column).
    ///
    /// Returns false when the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    async fn update(
        &self,
        collection: &str,
        id: &RecordId,
        changes: Document,
    ) -> Result<bool, StoreError>;

    /// Deletes a record. Returns false when the record does not exist.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    async fn delete(&self, collection: &str, id: &RecordId) -> Result<bool, StoreError>;
}
