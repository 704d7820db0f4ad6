//! Typed access to the document database holding user profiles.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod firestore;
pub mod memory;
pub mod query;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use query::{Direction, Filter, Operator, Query};

pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Map(Fields),
    /// Replaced with the commit time by the store.
    ServerTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The store could not be reached. Retrying later may succeed.
    Unavailable,
    NotFound,
    PermissionDenied,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() || err.is_timeout() { StoreErrorKind::Unavailable } else { StoreErrorKind::Other };
        StoreError::new(kind, err.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Fields>, StoreError>;

    /// Creates or fully replaces the document.
    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Replaces the given top-level fields of an existing document. Fails with
    /// [`StoreErrorKind::NotFound`] when the document does not exist.
    async fn update_document(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Documents matching `query`, as `(id, fields)` pairs in query order.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>, StoreError>;
}
