use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::manager::{AccessHandles, DatabaseManager};
use super::store::{row_id, Inserted, InsertedAll, NewRow, RecordStore, Row, StoreError};
use crate::filter::{filter::validate_identifier, Filter, FilterData};
use crate::types::Access;

/// Postgres-backed store.
///
/// Normal access runs every statement inside a transaction that assumes the
/// row-level role and publishes the caller's id as JWT claims, so the
/// database's row policies see the same identity the session resolved.
/// Elevated access uses the service pool as-is.
pub struct PgRecordStore {
    handles: AccessHandles,
    row_level_role: String,
}

impl PgRecordStore {
    pub fn new(handles: AccessHandles, row_level_role: impl Into<String>) -> Result<Self, StoreError> {
        let row_level_role = row_level_role.into();
        validate_identifier(&row_level_role).map_err(StoreError::InvalidIdentifier)?;
        Ok(Self { handles, row_level_role })
    }

    async fn begin(&self, access: Access) -> Result<Transaction<'static, Postgres>, StoreError> {
        let pool = self.handles.pool_for(access)?;
        let mut tx = pool.begin().await?;
        if let Access::Normal { user_id } = access {
            sqlx::query(&format!("SET LOCAL ROLE \"{}\"", self.row_level_role))
                .execute(&mut *tx)
                .await?;
            let claims = json!({ "sub": user_id.to_string(), "role": self.row_level_role }).to_string();
            sqlx::query("SELECT set_config('request.jwt.claims', $1, true)")
                .bind(claims)
                .execute(&mut *tx)
                .await?;
        }
        Ok(tx)
    }
}

fn into_row(value: Value) -> Result<Row, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::QueryError(format!("expected a JSON row, got {}", other))),
    }
}

fn quoted_columns(fields: &Row) -> Result<Vec<String>, StoreError> {
    fields
        .keys()
        .map(|c| {
            validate_identifier(c).map_err(StoreError::InvalidIdentifier)?;
            Ok(format!("\"{}\"", c))
        })
        .collect()
}

async fn fetch_in(conn: &mut PgConnection, table: &str, id: Uuid) -> Result<Option<Row>, StoreError> {
    let sql = format!("SELECT row_to_json(t) FROM \"{}\" t WHERE t.id = $1", table);
    let row: Option<Value> = sqlx::query_scalar(&sql).bind(id).fetch_optional(conn).await?;
    row.map(into_row).transpose()
}

// Values travel as one jsonb document; jsonb_populate_record casts each key to
// the column's declared type.
async fn insert_in(conn: &mut PgConnection, table: &str, fields: Row) -> Result<Row, StoreError> {
    validate_identifier(table).map_err(StoreError::InvalidIdentifier)?;
    let columns = quoted_columns(&fields)?.join(", ");
    let sql = format!(
        "WITH ins AS (INSERT INTO \"{t}\" ({c}) SELECT {c} FROM jsonb_populate_record(NULL::\"{t}\", $1) RETURNING *) \
         SELECT row_to_json(ins) FROM ins",
        t = table,
        c = columns
    );
    let row: Value = sqlx::query_scalar(&sql).bind(Value::Object(fields)).fetch_one(conn).await?;
    into_row(row)
}

/// Record `key` against the row about to be inserted.
///
/// Returns the previously created row when the key was already used for
/// `table`. A concurrent holder of the same key blocks the claim until it
/// commits, so only one of them inserts.
async fn claim_key(conn: &mut PgConnection, key: &str, table: &str, fields: &Row) -> Result<Option<Row>, StoreError> {
    let record_id = row_id(fields)
        .ok_or_else(|| StoreError::QueryError("idempotent insert requires an id".to_string()))?;
    let claimed = sqlx::query(
        "INSERT INTO idempotency_keys (key, tabla, record_id) VALUES ($1, $2, $3) \
         ON CONFLICT (key, tabla) DO NOTHING",
    )
    .bind(key)
    .bind(table)
    .bind(record_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if claimed == 1 {
        return Ok(None);
    }

    let existing: Uuid = sqlx::query_scalar("SELECT record_id FROM idempotency_keys WHERE key = $1 AND tabla = $2")
        .bind(key)
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
    match fetch_in(conn, table, existing).await? {
        Some(row) => Ok(Some(row)),
        None => Err(StoreError::Conflict(format!(
            "idempotency key already used for a record that is no longer visible ({})",
            existing
        ))),
    }
}

fn set_clause(fields: &Row) -> Result<String, StoreError> {
    Ok(quoted_columns(fields)?
        .into_iter()
        .map(|c| format!("{c} = src.{c}"))
        .collect::<Vec<_>>()
        .join(", "))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    fn supports_elevated(&self) -> bool {
        self.handles.elevated.is_some()
    }

    async fn fetch(&self, access: Access, table: &'static str, id: Uuid) -> Result<Option<Row>, StoreError> {
        let mut tx = self.begin(access).await?;
        let row = fetch_in(&mut tx, table, id).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn list(&self, access: Access, table: &'static str, filter: &FilterData) -> Result<Vec<Row>, StoreError> {
        let mut query = Filter::new(table)?;
        query.assign(filter.clone())?;
        let sql = query.to_sql()?;
        debug!(table, sql = %sql.query, "list");

        let mut tx = self.begin(access).await?;
        let mut q = sqlx::query_scalar::<_, Value>(&sql.query);
        for param in sql.params {
            q = q.bind(param);
        }
        let rows = q.fetch_all(&mut *tx).await?;
        tx.commit().await?;
        rows.into_iter().map(into_row).collect()
    }

    async fn insert(
        &self,
        access: Access,
        table: &'static str,
        fields: Row,
        idempotency_key: Option<&str>,
    ) -> Result<Inserted, StoreError> {
        let mut tx = self.begin(access).await?;

        if let Some(key) = idempotency_key {
            if let Some(row) = claim_key(&mut tx, key, table, &fields).await? {
                tx.commit().await?;
                return Ok(Inserted { row, replayed: true });
            }
        }

        let row = insert_in(&mut tx, table, fields).await?;
        tx.commit().await?;
        Ok(Inserted { row, replayed: false })
    }

    async fn insert_all(
        &self,
        access: Access,
        rows: Vec<NewRow>,
        idempotency_key: Option<&str>,
    ) -> Result<InsertedAll, StoreError> {
        let mut tx = self.begin(access).await?;

        if let (Some(key), Some(first)) = (idempotency_key, rows.first()) {
            if let Some(row) = claim_key(&mut tx, key, first.table, &first.fields).await? {
                tx.commit().await?;
                return Ok(InsertedAll { rows: vec![row], replayed: true });
            }
        }

        let mut out = Vec::with_capacity(rows.len());
        for new_row in rows {
            // Dropping the transaction on error rolls back every earlier insert
            out.push(insert_in(&mut tx, new_row.table, new_row.fields).await?);
        }
        tx.commit().await?;
        Ok(InsertedAll { rows: out, replayed: false })
    }

    async fn update(&self, access: Access, table: &'static str, id: Uuid, fields: Row) -> Result<Option<Row>, StoreError> {
        if fields.is_empty() {
            return self.fetch(access, table, id).await;
        }
        let sql = format!(
            "WITH upd AS (UPDATE \"{t}\" AS target SET {s} FROM jsonb_populate_record(NULL::\"{t}\", $1) AS src \
             WHERE target.id = $2 RETURNING target.*) SELECT row_to_json(upd) FROM upd",
            t = table,
            s = set_clause(&fields)?
        );
        let mut tx = self.begin(access).await?;
        let row: Option<Value> = sqlx::query_scalar(&sql)
            .bind(Value::Object(fields))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        row.map(into_row).transpose()
    }

    async fn update_where(
        &self,
        access: Access,
        table: &'static str,
        filter: &FilterData,
        fields: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let mut query = Filter::new(table)?;
        query.assign(FilterData { where_eq: filter.where_eq.clone(), ..Default::default() })?;
        let where_sql = query.to_where_sql(1)?;
        let sql = format!(
            "WITH upd AS (UPDATE \"{t}\" AS target SET {s} FROM jsonb_populate_record(NULL::\"{t}\", $1) AS src \
             WHERE target.id IN (SELECT id FROM \"{t}\" WHERE {w}) RETURNING target.*) SELECT row_to_json(upd) FROM upd",
            t = table,
            s = set_clause(&fields)?,
            w = where_sql.query
        );

        let mut tx = self.begin(access).await?;
        let mut q = sqlx::query_scalar::<_, Value>(&sql).bind(Value::Object(fields));
        for param in where_sql.params {
            q = q.bind(param);
        }
        let rows = q.fetch_all(&mut *tx).await?;
        tx.commit().await?;
        rows.into_iter().map(into_row).collect()
    }

    async fn delete(&self, access: Access, table: &'static str, id: Uuid) -> Result<Vec<Row>, StoreError> {
        let sql = format!(
            "WITH del AS (DELETE FROM \"{}\" WHERE id = $1 RETURNING *) SELECT row_to_json(del) FROM del",
            table
        );
        let mut tx = self.begin(access).await?;
        let rows: Vec<Value> = sqlx::query_scalar(&sql).bind(id).fetch_all(&mut *tx).await?;
        tx.commit().await?;
        rows.into_iter().map(into_row).collect()
    }

    async fn upsert(
        &self,
        access: Access,
        table: &'static str,
        fields: Row,
        conflict: &'static [&'static str],
    ) -> Result<Row, StoreError> {
        for column in conflict {
            validate_identifier(column).map_err(StoreError::InvalidIdentifier)?;
        }
        let columns = quoted_columns(&fields)?;
        let conflict_cols = conflict.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>();
        let updates = columns
            .iter()
            .filter(|c| !conflict_cols.contains(c) && c.as_str() != "\"id\"" && c.as_str() != "\"created_at\"")
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "WITH up AS (INSERT INTO \"{t}\" ({c}) SELECT {c} FROM jsonb_populate_record(NULL::\"{t}\", $1) \
             ON CONFLICT ({k}) {o} RETURNING *) SELECT row_to_json(up) FROM up",
            t = table,
            c = columns.join(", "),
            k = conflict_cols.join(", "),
            o = on_conflict
        );

        let mut tx = self.begin(access).await?;
        let row: Value = sqlx::query_scalar(&sql).bind(Value::Object(fields)).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        into_row(row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        DatabaseManager::health_check(&self.handles.normal).await
    }
}
