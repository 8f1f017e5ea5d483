use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{row_id, Inserted, InsertedAll, NewRow, RecordStore, Row, StoreError};
use crate::filter::{Filter, FilterData};
use crate::types::{Access, Privilege};

/// One data-access call as seen by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: &'static str,
    pub table: String,
    pub privilege: Privilege,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    idempotency: HashMap<(String, String), Uuid>,
    denied_normal: HashSet<String>,
    calls: Vec<StoreCall>,
}

impl Inner {
    fn record(&mut self, op: &'static str, table: &str, access: Access) -> Result<(), StoreError> {
        self.calls.push(StoreCall { op, table: table.to_string(), privilege: access.privilege() });
        if access.privilege() == Privilege::Normal && self.denied_normal.contains(table) {
            return Err(StoreError::PermissionDenied(format!(
                "permission denied for table {}",
                table
            )));
        }
        Ok(())
    }

    fn table(&mut self, table: &str) -> &mut Vec<Row> {
        self.tables.entry(table.to_string()).or_default()
    }

    /// Returns the row an earlier use of `key` created, or records the key
    /// against the row about to be inserted
    fn claim_key(&mut self, key: &str, table: &str, fields: &Row) -> Result<Option<Row>, StoreError> {
        let slot = (key.to_string(), table.to_string());
        if let Some(existing) = self.idempotency.get(&slot).copied() {
            let row = self.table(table).iter().find(|r| row_id(r) == Some(existing)).cloned();
            return match row {
                Some(row) => Ok(Some(row)),
                None => Err(StoreError::Conflict(format!(
                    "idempotency key already used for a record that is no longer visible ({})",
                    existing
                ))),
            };
        }
        let record_id = row_id(fields)
            .ok_or_else(|| StoreError::QueryError("idempotent insert requires an id".to_string()))?;
        self.idempotency.insert(slot, record_id);
        Ok(None)
    }

    fn release_key(&mut self, key: Option<&str>, table: &str) {
        if let Some(key) = key {
            self.idempotency.remove(&(key.to_string(), table.to_string()));
        }
    }

    fn push(&mut self, table: &str, fields: Row) -> Result<Row, StoreError> {
        let id = row_id(&fields);
        let rows = self.table(table);
        if id.is_some() && rows.iter().any(|r| row_id(r) == id) {
            return Err(StoreError::Conflict(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                table
            )));
        }
        rows.push(fields.clone());
        Ok(fields)
    }
}

/// In-process store for development and tests.
///
/// Tables are plain vectors of JSON rows. Normal access to a table can be
/// denied to stand in for a row-level restriction, and every call is
/// journaled with the privilege it ran under.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    elevated: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()), elevated: true }
    }

    /// A store with no elevated handle configured
    pub fn without_elevated() -> Self {
        Self { inner: Mutex::new(Inner::default()), elevated: false }
    }

    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut inner = self.inner.lock().await;
        inner.table(table).extend(rows);
    }

    /// Refuse normal-privilege access to `table`, as a row-level policy would
    pub async fn deny_normal_access(&self, table: &str) {
        self.inner.lock().await.denied_normal.insert(table.to_string());
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner.lock().await.tables.get(table).cloned().unwrap_or_default()
    }
}

fn merge(row: &mut Row, fields: &Row) {
    for (k, v) in fields {
        row.insert(k.clone(), v.clone());
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn supports_elevated(&self) -> bool {
        self.elevated
    }

    async fn fetch(&self, access: Access, table: &'static str, id: Uuid) -> Result<Option<Row>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.record("fetch", table, access)?;
        Ok(inner.table(table).iter().find(|r| row_id(r) == Some(id)).cloned())
    }

    async fn list(&self, access: Access, table: &'static str, filter: &FilterData) -> Result<Vec<Row>, StoreError> {
        let mut query = Filter::new(table)?;
        query.assign(filter.clone())?;
        let mut inner = self.inner.lock().await;
        inner.record("list", table, access)?;
        Ok(query.apply(inner.table(table).iter().cloned()))
    }

    async fn insert(
        &self,
        access: Access,
        table: &'static str,
        fields: Row,
        idempotency_key: Option<&str>,
    ) -> Result<Inserted, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.record("insert", table, access)?;

        if let Some(key) = idempotency_key {
            if let Some(row) = inner.claim_key(key, table, &fields)? {
                return Ok(Inserted { row, replayed: true });
            }
        }

        match inner.push(table, fields) {
            Ok(row) => Ok(Inserted { row, replayed: false }),
            Err(err) => {
                inner.release_key(idempotency_key, table);
                Err(err)
            }
        }
    }

    async fn insert_all(
        &self,
        access: Access,
        rows: Vec<NewRow>,
        idempotency_key: Option<&str>,
    ) -> Result<InsertedAll, StoreError> {
        let mut inner = self.inner.lock().await;
        for new_row in &rows {
            inner.record("insert", new_row.table, access)?;
        }

        let first_table = rows.first().map(|r| r.table);
        if let (Some(key), Some(first)) = (idempotency_key, rows.first()) {
            if let Some(row) = inner.claim_key(key, first.table, &first.fields)? {
                return Ok(InsertedAll { rows: vec![row], replayed: true });
            }
        }

        // Restore the snapshot on failure so no partial state remains
        let snapshot = inner.tables.clone();
        let mut out = Vec::with_capacity(rows.len());
        for new_row in rows {
            match inner.push(new_row.table, new_row.fields) {
                Ok(row) => out.push(row),
                Err(err) => {
                    inner.tables = snapshot;
                    if let Some(table) = first_table {
                        inner.release_key(idempotency_key, table);
                    }
                    return Err(err);
                }
            }
        }
        Ok(InsertedAll { rows: out, replayed: false })
    }

    async fn update(&self, access: Access, table: &'static str, id: Uuid, fields: Row) -> Result<Option<Row>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.record("update", table, access)?;
        let updated = inner.table(table).iter_mut().find(|r| row_id(r) == Some(id)).map(|row| {
            merge(row, &fields);
            row.clone()
        });
        Ok(updated)
    }

    async fn update_where(
        &self,
        access: Access,
        table: &'static str,
        filter: &FilterData,
        fields: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.record("update", table, access)?;
        let mut out = Vec::new();
        for row in inner.table(table).iter_mut().filter(|r| filter.matches(r)) {
            merge(row, &fields);
            out.push(row.clone());
        }
        Ok(out)
    }

    async fn delete(&self, access: Access, table: &'static str, id: Uuid) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.record("delete", table, access)?;
        let rows = inner.table(table);
        let (removed, kept): (Vec<Row>, Vec<Row>) = rows.drain(..).partition(|r| row_id(r) == Some(id));
        *rows = kept;
        Ok(removed)
    }

    async fn upsert(
        &self,
        access: Access,
        table: &'static str,
        fields: Row,
        conflict: &'static [&'static str],
    ) -> Result<Row, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.record("upsert", table, access)?;
        let key = conflict
            .iter()
            .fold(FilterData::default(), |f, c| f.and_eq(*c, fields.get(*c).cloned().unwrap_or(Value::Null)));

        if let Some(row) = inner.table(table).iter_mut().find(|r| key.matches(r)) {
            for (k, v) in &fields {
                if k != "id" && k != "created_at" {
                    row.insert(k.clone(), v.clone());
                }
            }
            return Ok(row.clone());
        }
        inner.push(table, fields)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
