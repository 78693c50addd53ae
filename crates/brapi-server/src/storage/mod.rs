//! Record storage collaborators
//!
//! The mapping engine never talks to a database directly. It goes through
//! [`RecordStore`], which exposes the handful of operations the engine needs:
//! filtered identifier queries, bulk loads, and create/update/delete.
//!
//! Two implementations ship with the server:
//!
//! - [`memory::MemoryRecordStore`]: process-local, optionally seeded from a
//!   JSON file; used by tests and demos
//! - [`postgres::PgRecordStore`]: records in a single `jsonb` table

pub mod memory;
pub mod postgres;
pub mod record;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;
pub use record::{
    scalar_text, ContentTarget, FieldData, FilterSet, FilterValue, Record, ID_FIELD,
};

/// Result type alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record {kind}/{id} not found")]
    NotFound { kind: String, id: String },

    #[error("Record {kind}/{id} already exists")]
    Duplicate { kind: String, id: String },
}

/// Window of a query result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRange {
    pub offset: u64,
    pub limit: u64,
}

/// Identifiers matching a query, in storage order, with the unpaged total
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub ids: Vec<String>,
    pub total_count: u64,
}

/// Queryable record store
///
/// Filters use IN semantics for list operands and every filter must match.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query(
        &self,
        target: &ContentTarget,
        filters: &FilterSet,
        range: Option<QueryRange>,
    ) -> StoreResult<QueryPage>;

    /// Load records by identifier, preserving the order of `ids` and skipping
    /// unknown identifiers
    async fn load_many(&self, kind: &str, ids: &[String]) -> StoreResult<Vec<Record>>;

    /// Create a record; the store assigns an identifier when `id` is `None`
    async fn create(
        &self,
        target: &ContentTarget,
        id: Option<String>,
        fields: BTreeMap<String, FieldData>,
    ) -> StoreResult<Record>;

    /// Overwrite the given fields, leaving the others untouched
    async fn update_fields(
        &self,
        kind: &str,
        id: &str,
        fields: BTreeMap<String, FieldData>,
    ) -> StoreResult<Record>;

    /// Returns `false` when nothing was deleted
    async fn delete(&self, kind: &str, id: &str) -> StoreResult<bool>;
}
