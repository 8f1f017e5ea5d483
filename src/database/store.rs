use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::filter::FilterData;
use crate::types::Access;

pub type Row = Map<String, Value>;

/// Errors from a record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row-level policy refused the statement
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Unique or foreign-key constraint refused the statement
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Elevated access is not configured")]
    ElevatedUnavailable,

    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                // insufficient_privilege, raised by row-level security and grants
                Some("42501") => return StoreError::PermissionDenied(db_err.message().to_string()),
                // unique_violation, foreign_key_violation
                Some("23505") | Some("23503") => return StoreError::Conflict(db_err.message().to_string()),
                _ => {}
            }
        }
        StoreError::Sqlx(err)
    }
}

impl From<crate::filter::FilterError> for StoreError {
    fn from(err: crate::filter::FilterError) -> Self {
        StoreError::InvalidIdentifier(err.to_string())
    }
}

/// One row to insert as part of an atomic unit
#[derive(Debug, Clone)]
pub struct NewRow {
    pub table: &'static str,
    pub fields: Row,
}

/// Result of an insert that may have been replayed from an idempotency key
#[derive(Debug, Clone)]
pub struct Inserted {
    pub row: Row,
    /// True when the key was seen before and no new row was written
    pub replayed: bool,
}

/// Result of an atomic multi-row insert.
///
/// On a replay only the first row (the one the key was recorded against) is
/// returned.
#[derive(Debug, Clone)]
pub struct InsertedAll {
    pub rows: Vec<Row>,
    pub replayed: bool,
}

/// Data access with an explicit privilege per call.
///
/// Rows travel as JSON maps; table and column names always come from the
/// resource definitions, never from request input.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether an elevated handle was configured
    fn supports_elevated(&self) -> bool;

    async fn fetch(&self, access: Access, table: &'static str, id: Uuid) -> Result<Option<Row>, StoreError>;

    async fn list(&self, access: Access, table: &'static str, filter: &FilterData) -> Result<Vec<Row>, StoreError>;

    /// Insert one row. With an idempotency key, a key already recorded for
    /// `table` returns the row it created instead of inserting again.
    async fn insert(
        &self,
        access: Access,
        table: &'static str,
        fields: Row,
        idempotency_key: Option<&str>,
    ) -> Result<Inserted, StoreError>;

    /// Insert several rows in one transaction: all of them or none. The
    /// idempotency key, if any, is recorded against the first row.
    async fn insert_all(
        &self,
        access: Access,
        rows: Vec<NewRow>,
        idempotency_key: Option<&str>,
    ) -> Result<InsertedAll, StoreError>;

    /// Write only the given columns; `None` when no row matched
    async fn update(&self, access: Access, table: &'static str, id: Uuid, fields: Row) -> Result<Option<Row>, StoreError>;

    async fn update_where(
        &self,
        access: Access,
        table: &'static str,
        filter: &FilterData,
        fields: Row,
    ) -> Result<Vec<Row>, StoreError>;

    /// Hard delete; returns the removed rows
    async fn delete(&self, access: Access, table: &'static str, id: Uuid) -> Result<Vec<Row>, StoreError>;

    /// Insert, or update the existing row matching `conflict` columns
    async fn upsert(
        &self,
        access: Access,
        table: &'static str,
        fields: Row,
        conflict: &'static [&'static str],
    ) -> Result<Row, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Read the `id` column of a row
pub fn row_id(row: &Row) -> Option<Uuid> {
    row.get("id").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}
