//! Record gateway: one authorized data operation per call.
//!
//! Each operation validates the id, decides authorization through the
//! policy, and then issues a single store call with the decided privilege.
//! Ownership-gated operations load the row first (at the caller's own
//! privilege) so the policy can see who owns it.

mod query;

use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::{Uuid, Variant};

use crate::config::AppConfig;
use crate::database::{row_id, NewRow, Record, RecordStore, Row};
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::policy::{self, Decision, Ownership};
use crate::resources::{youth, FieldErrors, ResourceKind, SanitizeMode};
use crate::types::{Access, Identity, Operation, Privilege};

pub use query::list_filter;

/// Conflict columns for permission upserts
const PERMISO_KEY: &[&str] = &["rol_id", "modulo_id"];
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Outcome of a create
#[derive(Debug, Clone)]
pub struct Created {
    pub row: Row,
    /// True when an earlier request with the same idempotency key created it
    pub replayed: bool,
}

/// Parse a record id, accepting only hyphenated RFC 4122 UUIDs of versions 1-5
pub fn parse_record_id(raw: &str) -> Result<Uuid, ApiError> {
    let invalid = || ApiError::validation(format!("Invalid id format: '{}'", raw));
    if raw.len() != 36 {
        return Err(invalid());
    }
    let id = Uuid::parse_str(raw).map_err(|_| invalid())?;
    match (id.get_version_num(), id.get_variant()) {
        (1..=5, Variant::RFC4122) => Ok(id),
        _ => Err(invalid()),
    }
}

fn not_found(kind: ResourceKind, id: Uuid) -> ApiError {
    ApiError::not_found(format!("{} {} not found", kind, id))
}

pub struct RecordGateway<'a> {
    store: &'a dyn RecordStore,
    config: &'a AppConfig,
    identity: &'a Identity,
}

impl<'a> RecordGateway<'a> {
    pub fn new(store: &'a dyn RecordStore, config: &'a AppConfig, identity: &'a Identity) -> Self {
        Self { store, config, identity }
    }

    pub fn identity(&self) -> &Identity {
        self.identity
    }

    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn present(&self, kind: ResourceKind, row: Row) -> Row {
        youth::present(kind, row, self.today())
    }

    fn own_access(&self) -> Access {
        Access::Normal { user_id: self.identity.user_id }
    }

    /// Concrete access for a decided privilege.
    ///
    /// Without an elevated handle an admin falls back to their own access;
    /// a normal decision never becomes elevated.
    fn access_for(&self, privilege: Privilege) -> Access {
        match privilege {
            Privilege::Elevated if self.store.supports_elevated() => Access::Elevated,
            Privilege::Elevated => {
                warn!(user_id = %self.identity.user_id, "elevated access not configured, using normal privilege");
                self.own_access()
            }
            Privilege::Normal => self.own_access(),
        }
    }

    fn authorize(&self, kind: ResourceKind, op: Operation, ownership: Ownership) -> Result<Access, ApiError> {
        match policy::decide(self.identity, kind, op, ownership) {
            Decision::Allow(privilege) => {
                debug!(
                    user_id = %self.identity.user_id,
                    role = %self.identity.role,
                    resource = %kind,
                    op = op.as_str(),
                    privilege = ?privilege,
                    "authorized"
                );
                Ok(self.access_for(privilege))
            }
            Decision::Deny(reason) => {
                info!(
                    user_id = %self.identity.user_id,
                    role = %self.identity.role,
                    resource = %kind,
                    op = op.as_str(),
                    "denied"
                );
                Err(ApiError::forbidden(reason))
            }
        }
    }

    /// Load a row at the caller's own privilege to evaluate ownership
    async fn load_owned(&self, kind: ResourceKind, id: Uuid) -> Result<(Row, Ownership), ApiError> {
        let row = self
            .store
            .fetch(self.own_access(), kind.table(), id)
            .await?
            .ok_or_else(|| not_found(kind, id))?;
        let ownership = Ownership::of(kind.def().owner_of(&row), self.identity.user_id);
        Ok((row, ownership))
    }

    /// Authorize `op` on one record, loading it first when ownership matters.
    /// Returns the access to use and the loaded row, if any.
    async fn authorize_record(
        &self,
        kind: ResourceKind,
        op: Operation,
        id: Uuid,
    ) -> Result<(Access, Option<Row>), ApiError> {
        if policy::needs_ownership(self.identity, kind, op) {
            let (row, ownership) = self.load_owned(kind, id).await?;
            let access = self.authorize(kind, op, ownership)?;
            Ok((access, Some(row)))
        } else {
            Ok((self.authorize(kind, op, Ownership::NotApplicable)?, None))
        }
    }

    pub async fn get(&self, kind: ResourceKind, id: &str) -> Result<Row, ApiError> {
        let id = parse_record_id(id)?;
        let (access, loaded) = self.authorize_record(kind, Operation::Read, id).await?;
        let row = match loaded {
            Some(row) => row,
            None => self
                .store
                .fetch(access, kind.table(), id)
                .await?
                .ok_or_else(|| not_found(kind, id))?,
        };
        Ok(self.present(kind, row))
    }

    pub async fn list(&self, kind: ResourceKind, params: &HashMap<String, String>) -> Result<Vec<Row>, ApiError> {
        let mut filter = list_filter(kind, params, &self.config.api)?;
        let access = self.authorize(kind, Operation::List, Ownership::NotApplicable)?;
        if let Some(column) = policy::list_scope(self.identity, kind) {
            filter.where_eq.insert(column.to_string(), json!(self.identity.user_id.to_string()));
        }
        let rows = self.store.list(access, kind.table(), &filter).await?;
        Ok(rows.into_iter().map(|r| self.present(kind, r)).collect())
    }

    /// Validate a create body and stamp server-managed fields
    fn prepare_create(&self, kind: ResourceKind, body: &Value) -> Result<Record, ApiError> {
        let mut record = Record::from_api_input(kind, body, SanitizeMode::Create)?;
        record.prepare_create(Uuid::new_v4(), Utc::now());
        if let Some(creator) = kind.def().creator_field {
            record.set_system_field(creator, self.identity.user_id.to_string());
        }
        Ok(record)
    }

    /// Idempotency keys are scoped to the caller so two users never collide
    fn scoped_key(&self, key: Option<&str>) -> Result<Option<String>, ApiError> {
        match key.map(str::trim) {
            None | Some("") => Ok(None),
            Some(k) if k.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(ApiError::validation(format!(
                "Idempotency-Key must be at most {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            ))),
            Some(k) => Ok(Some(format!("{}:{}", self.identity.user_id, k))),
        }
    }

    pub async fn create(&self, kind: ResourceKind, body: &Value, idempotency_key: Option<&str>) -> Result<Created, ApiError> {
        let access = self.authorize(kind, Operation::Create, Ownership::NotApplicable)?;
        let key = self.scoped_key(idempotency_key)?;
        let record = self.prepare_create(kind, body)?;

        let inserted = self
            .store
            .insert(access, kind.table(), record.into_fields(), key.as_deref())
            .await?;
        if inserted.replayed {
            info!(resource = %kind, record_id = ?row_id(&inserted.row), "replayed idempotent create");
        }
        Ok(Created { row: self.present(kind, inserted.row), replayed: inserted.replayed })
    }

    /// Create an attention together with its form detail, atomically.
    ///
    /// The detail is linked to the new attention and, unless it names one,
    /// to the attention's youth. Field errors of the detail are reported
    /// under `formulario.<field>`.
    pub async fn create_linked(
        &self,
        body: &Value,
        form: &Value,
        idempotency_key: Option<&str>,
    ) -> Result<Created, ApiError> {
        let access = self.authorize(ResourceKind::Atencion, Operation::Create, Ownership::NotApplicable)?;
        self.authorize(ResourceKind::Formulario, Operation::Create, Ownership::NotApplicable)?;
        let key = self.scoped_key(idempotency_key)?;

        let mut errors = FieldErrors::new();
        let attention = self.prepare_create(ResourceKind::Atencion, body);
        let detail = self.prepare_create(ResourceKind::Formulario, form);
        if let Err(ApiError::ValidationFailed { field_errors: Some(fields), .. }) = &attention {
            errors.extend(fields.clone());
        }
        if let Err(ApiError::ValidationFailed { field_errors: Some(fields), .. }) = &detail {
            errors.extend(fields.iter().map(|(k, v)| (format!("formulario.{}", k), v.clone())));
        }
        if !errors.is_empty() {
            return Err(ApiError::validation_fields("Invalid or missing fields", errors));
        }
        let (attention, mut detail) = (attention?, detail?);

        let attention_id = attention.get("id").cloned().unwrap_or(Value::Null);
        detail.set_system_field("atencion_id", attention_id.clone());
        if detail.get("joven_id").map_or(true, Value::is_null) {
            detail.set_system_field("joven_id", attention.get("joven_id").cloned().unwrap_or(Value::Null));
        }

        let inserted = self
            .store
            .insert_all(
                access,
                vec![
                    NewRow { table: ResourceKind::Atencion.table(), fields: attention.into_fields() },
                    NewRow { table: ResourceKind::Formulario.table(), fields: detail.into_fields() },
                ],
                key.as_deref(),
            )
            .await?;

        let mut rows = inserted.rows.into_iter();
        let mut row = rows
            .next()
            .ok_or_else(|| ApiError::upstream("Create returned no rows", "empty insert result"))?;
        let form_row = match rows.next() {
            Some(form_row) => Some(form_row),
            None => {
                // Replay: the key only returns the attention, find its detail
                let filter = FilterData::eq("atencion_id", row.get("id").cloned().unwrap_or(attention_id));
                self.store
                    .list(access, ResourceKind::Formulario.table(), &filter)
                    .await?
                    .into_iter()
                    .next()
            }
        };
        row.insert("formulario".to_string(), form_row.map(Value::Object).unwrap_or(Value::Null));
        Ok(Created { row, replayed: inserted.replayed })
    }

    /// Partial update: only fields present in `body` are written
    pub async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Row, ApiError> {
        let id = parse_record_id(id)?;
        let (access, loaded) = self.authorize_record(kind, Operation::Update, id).await?;

        let mut record = Record::from_api_input(kind, body, SanitizeMode::Update)?;
        if let Some(row) = loaded {
            record.inject(row);
        }
        if !self.identity.is_admin() {
            let fixed: FieldErrors = kind
                .def()
                .fixed_fields
                .iter()
                .filter(|name| record.changed(name))
                .map(|name| (name.to_string(), "This field cannot be changed".to_string()))
                .collect();
            if !fixed.is_empty() {
                info!(user_id = %self.identity.user_id, resource = %kind, record_id = %id, fields = ?fixed.keys().collect::<Vec<_>>(), "rejected change to fixed fields");
                return Err(ApiError::validation_fields("Invalid or missing fields", fixed));
            }
        }
        record.touch_updated_at(Utc::now());
        if record.original().is_some() {
            debug!(resource = %kind, record_id = %id, changed = ?record.changed_fields(), "update");
        }

        let row = self
            .store
            .update(access, kind.table(), id, record.into_fields())
            .await?
            .ok_or_else(|| not_found(kind, id))?;
        Ok(self.present(kind, row))
    }

    /// Hard delete; returns the removed rows
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Vec<Row>, ApiError> {
        let id = parse_record_id(id)?;
        let (access, _) = self.authorize_record(kind, Operation::Delete, id).await?;

        let rows = self.store.delete(access, kind.table(), id).await?;
        if rows.is_empty() {
            return Err(not_found(kind, id));
        }
        if self.config.security.enable_audit_logging {
            info!(
                target: "audit",
                actor = %self.identity.user_id,
                role = %self.identity.role,
                resource = %kind,
                record_id = %id,
                "record deleted"
            );
        }
        Ok(rows.into_iter().map(|r| self.present(kind, r)).collect())
    }

    /// Replace the permission flags of a role, one entry per module.
    ///
    /// Accepts `[{modulo_id, puede_*}]` or `{"permisos": [...]}`. Flags
    /// missing from an entry are written as false.
    pub async fn upsert_permissions(&self, role_id: &str, body: &Value) -> Result<Vec<Row>, ApiError> {
        let role_id = parse_record_id(role_id)?;
        let access = self.authorize(ResourceKind::Permiso, Operation::Update, Ownership::NotApplicable)?;

        let entries = match body {
            Value::Array(entries) => entries,
            Value::Object(map) => match map.get("permisos") {
                Some(Value::Array(entries)) => entries,
                _ => return Err(ApiError::validation("Expected a list of permissions")),
            },
            _ => return Err(ApiError::validation("Expected a list of permissions")),
        };

        let mut errors = FieldErrors::new();
        let mut records = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let mut entry = entry.clone();
            if let Value::Object(map) = &mut entry {
                map.insert("rol_id".to_string(), json!(role_id.to_string()));
            }
            match self.prepare_create(ResourceKind::Permiso, &entry) {
                Ok(record) => records.push(record),
                Err(ApiError::ValidationFailed { field_errors: Some(fields), .. }) => {
                    errors.extend(fields.into_iter().map(|(k, v)| (format!("permisos[{}].{}", i, k), v)));
                }
                Err(other) => return Err(other),
            }
        }
        if !errors.is_empty() {
            return Err(ApiError::validation_fields("Invalid permissions", errors));
        }

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(
                self.store
                    .upsert(access, ResourceKind::Permiso.table(), record.into_fields(), PERMISO_KEY)
                    .await?,
            );
        }
        Ok(out)
    }

    /// Mark one notification read
    pub async fn mark_read(&self, id: &str) -> Result<Row, ApiError> {
        let body = json!({ "leida": true, "fecha_lectura": Utc::now().to_rfc3339() });
        self.update(ResourceKind::Notificacion, id, &body).await
    }

    /// Mark every unread notification of the caller read
    pub async fn mark_all_read(&self) -> Result<Vec<Row>, ApiError> {
        let kind = ResourceKind::Notificacion;
        let access = self.authorize(kind, Operation::Update, Ownership::Owner)?;
        let filter = FilterData::eq("usuario_id", self.identity.user_id.to_string()).and_eq("leida", false);
        let now = Utc::now().to_rfc3339();
        let mut fields = Map::new();
        fields.insert("leida".to_string(), json!(true));
        fields.insert("fecha_lectura".to_string(), json!(now));
        fields.insert("updated_at".to_string(), json!(now));
        Ok(self.store.update_where(access, kind.table(), &filter, fields).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::resources::Role;
    use assert_matches::assert_matches;

    fn caller(role: Role) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "user@inami.example".into(),
            nombre_completo: "Usuario Prueba".into(),
            role,
        }
    }

    fn joven_body() -> Value {
        json!({
            "nombres": "Ana",
            "apellidos": "Lopez",
            "fecha_nacimiento": "2008-05-01",
            "centro_id": "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50",
            "fecha_ingreso": "2024-01-10"
        })
    }

    #[test]
    fn record_ids_must_be_versioned_uuids() {
        assert!(parse_record_id("7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50").is_ok());
        assert!(parse_record_id("7F8E2A4C-1D3B-4C5E-9F6A-0B1C2D3E4F50").is_ok());
        // version 0 and variant bits outside 8-b
        assert!(parse_record_id("7f8e2a4c-1d3b-0c5e-9f6a-0b1c2d3e4f50").is_err());
        assert!(parse_record_id("7f8e2a4c-1d3b-4c5e-cf6a-0b1c2d3e4f50").is_err());
        // simple form and garbage
        assert!(parse_record_id("7f8e2a4c1d3b4c5e9f6a0b1c2d3e4f50").is_err());
        assert!(parse_record_id("abc").is_err());
        assert!(parse_record_id("").is_err());
    }

    #[tokio::test]
    async fn malformed_id_makes_no_store_call() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        let gateway = RecordGateway::new(&store, &config, &admin);
        assert_matches!(
            gateway.get(ResourceKind::Joven, "not-an-id").await,
            Err(ApiError::ValidationFailed { .. })
        );
        assert_matches!(
            gateway.delete(ResourceKind::Atencion, "1234").await,
            Err(ApiError::ValidationFailed { .. })
        );
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn admin_read_uses_elevated_once_and_others_never() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        let medico = caller(Role::Medico);

        let created = RecordGateway::new(&store, &config, &admin)
            .create(ResourceKind::Joven, &joven_body(), None)
            .await
            .unwrap();
        let id = created.row["id"].as_str().unwrap().to_string();
        store.clear_calls().await;

        RecordGateway::new(&store, &config, &admin).get(ResourceKind::Joven, &id).await.unwrap();
        let calls = store.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].privilege, Privilege::Elevated);

        store.clear_calls().await;
        RecordGateway::new(&store, &config, &medico).get(ResourceKind::Joven, &id).await.unwrap();
        assert!(store.calls().await.iter().all(|c| c.privilege == Privilege::Normal));
    }

    #[tokio::test]
    async fn admin_without_elevated_handle_falls_back_to_normal() {
        let store = MemoryStore::without_elevated();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        RecordGateway::new(&store, &config, &admin)
            .list(ResourceKind::Usuario, &HashMap::new())
            .await
            .unwrap();
        assert_eq!(store.calls().await[0].privilege, Privilege::Normal);
    }

    #[tokio::test]
    async fn create_fills_defaults_and_derives_age() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let pedagogo = caller(Role::Pedagogo);
        let created = RecordGateway::new(&store, &config, &pedagogo)
            .create(ResourceKind::Joven, &joven_body(), None)
            .await
            .unwrap();
        assert_eq!(created.row["estado"], json!("activo"));
        let expected = youth::age_on(NaiveDate::from_ymd_opt(2008, 5, 1).unwrap(), Utc::now().date_naive());
        assert_eq!(created.row["edad"], json!(expected));
        // age is never persisted
        assert!(store.rows("jovenes").await[0].get("edad").is_none());
    }

    #[tokio::test]
    async fn attention_records_its_professional() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let medico = caller(Role::Medico);
        let created = RecordGateway::new(&store, &config, &medico)
            .create(
                ResourceKind::Atencion,
                &json!({
                    "joven_id": "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50",
                    "tipo_atencion": "salud",
                    "fecha_atencion": "2024-03-01T10:00:00Z",
                    "motivo": "Control",
                    "profesional_id": Uuid::new_v4().to_string()
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(created.row["profesional_id"], json!(medico.user_id.to_string()));
        assert_eq!(created.row["estado"], json!("pendiente"));
    }

    #[tokio::test]
    async fn non_owner_update_is_forbidden_before_validation() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let owner = caller(Role::Medico);
        let other = caller(Role::Psicologo);
        let created = RecordGateway::new(&store, &config, &owner)
            .create(
                ResourceKind::Atencion,
                &json!({
                    "joven_id": "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50",
                    "tipo_atencion": "salud",
                    "fecha_atencion": "2024-03-01",
                    "motivo": "Control"
                }),
                None,
            )
            .await
            .unwrap();
        let id = created.row["id"].as_str().unwrap().to_string();

        let result = RecordGateway::new(&store, &config, &other)
            .update(ResourceKind::Atencion, &id, &json!({ "tipo_atencion": "astrologia" }))
            .await;
        assert_matches!(result, Err(ApiError::Forbidden(_)));

        let updated = RecordGateway::new(&store, &config, &owner)
            .update(ResourceKind::Atencion, &id, &json!({ "estado": "completada" }))
            .await
            .unwrap();
        assert_eq!(updated["estado"], json!("completada"));
        assert_eq!(updated["motivo"], json!("Control"));
    }

    #[tokio::test]
    async fn deleting_missing_record_is_not_found() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        let result = RecordGateway::new(&store, &config, &admin)
            .delete(ResourceKind::Centro, &Uuid::new_v4().to_string())
            .await;
        assert_matches!(result, Err(ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn same_idempotency_key_creates_once() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let medico = caller(Role::Medico);
        let gateway = RecordGateway::new(&store, &config, &medico);
        let a = gateway.create(ResourceKind::Joven, &joven_body(), Some("form-1")).await.unwrap();
        let b = gateway.create(ResourceKind::Joven, &joven_body(), Some("form-1")).await.unwrap();
        assert!(!a.replayed && b.replayed);
        assert_eq!(a.row["id"], b.row["id"]);
        assert_eq!(store.rows("jovenes").await.len(), 1);
    }

    #[tokio::test]
    async fn linked_create_reports_detail_errors_and_writes_nothing() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let medico = caller(Role::Medico);
        let result = RecordGateway::new(&store, &config, &medico)
            .create_linked(
                &json!({
                    "joven_id": "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50",
                    "tipo_atencion": "salud",
                    "fecha_atencion": "2024-03-01",
                    "motivo": "Control"
                }),
                &json!({ "datos": { "peso": 60 } }),
                None,
            )
            .await;
        match result {
            Err(ApiError::ValidationFailed { field_errors: Some(errors), .. }) => {
                assert!(errors.contains_key("formulario.tipo_formulario"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(store.rows("atenciones").await.is_empty());
    }

    #[tokio::test]
    async fn linked_create_links_detail_to_attention() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let medico = caller(Role::Medico);
        let created = RecordGateway::new(&store, &config, &medico)
            .create_linked(
                &json!({
                    "joven_id": "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50",
                    "tipo_atencion": "salud",
                    "fecha_atencion": "2024-03-01",
                    "motivo": "Control"
                }),
                &json!({ "tipo_formulario": "medico", "datos": { "peso": 60 } }),
                None,
            )
            .await
            .unwrap();
        let form = &created.row["formulario"];
        assert_eq!(form["atencion_id"], created.row["id"]);
        assert_eq!(form["joven_id"], json!("7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50"));
        assert_eq!(form["creado_por"], json!(medico.user_id.to_string()));
    }

    #[tokio::test]
    async fn notifications_list_only_own() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        let user = caller(Role::TrabajadorSocial);
        let admin_gateway = RecordGateway::new(&store, &config, &admin);
        for target in [user.user_id, admin.user_id] {
            admin_gateway
                .create(
                    ResourceKind::Notificacion,
                    &json!({ "usuario_id": target.to_string(), "titulo": "Cita", "mensaje": "Mañana", "tipo": "cita_proxima" }),
                    None,
                )
                .await
                .unwrap();
        }

        let gateway = RecordGateway::new(&store, &config, &user);
        let mine = gateway.list(ResourceKind::Notificacion, &HashMap::new()).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0]["leida"], json!(false));

        let read = gateway.mark_all_read().await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0]["leida"], json!(true));
    }

    #[tokio::test]
    async fn notification_owner_cannot_reassign_it() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        let owner = caller(Role::Medico);
        let other = caller(Role::Psicologo);
        let created = RecordGateway::new(&store, &config, &admin)
            .create(
                ResourceKind::Notificacion,
                &json!({ "usuario_id": owner.user_id.to_string(), "titulo": "Cita", "mensaje": "Mañana", "tipo": "cita_proxima" }),
                None,
            )
            .await
            .unwrap();
        let id = created.row["id"].as_str().unwrap().to_string();

        let owner_gateway = RecordGateway::new(&store, &config, &owner);
        let result = owner_gateway
            .update(
                ResourceKind::Notificacion,
                &id,
                &json!({ "usuario_id": other.user_id.to_string(), "mensaje": "Otro texto" }),
            )
            .await;
        assert_matches!(result, Err(ApiError::ValidationFailed { field_errors: Some(ref errors), .. }) if errors.contains_key("usuario_id"));

        let inbox = RecordGateway::new(&store, &config, &other)
            .list(ResourceKind::Notificacion, &HashMap::new())
            .await
            .unwrap();
        assert!(inbox.is_empty());
        let stored = owner_gateway.get(ResourceKind::Notificacion, &id).await.unwrap();
        assert_eq!(stored["mensaje"], json!("Mañana"));

        // Resending the stored owner is not a change
        let updated = owner_gateway
            .update(
                ResourceKind::Notificacion,
                &id,
                &json!({ "usuario_id": owner.user_id.to_string(), "leida": true }),
            )
            .await
            .unwrap();
        assert_eq!(updated["leida"], json!(true));

        let moved = RecordGateway::new(&store, &config, &admin)
            .update(ResourceKind::Notificacion, &id, &json!({ "usuario_id": other.user_id.to_string() }))
            .await
            .unwrap();
        assert_eq!(moved["usuario_id"], json!(other.user_id.to_string()));
    }

    #[tokio::test]
    async fn form_owner_cannot_move_it_to_another_attention() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let medico = caller(Role::Medico);
        let gateway = RecordGateway::new(&store, &config, &medico);
        let form = gateway
            .create(
                ResourceKind::Formulario,
                &json!({
                    "atencion_id": Uuid::new_v4().to_string(),
                    "tipo_formulario": "medico",
                    "datos": { "peso": 60 }
                }),
                None,
            )
            .await
            .unwrap();
        let id = form.row["id"].as_str().unwrap().to_string();

        let result = gateway
            .update(ResourceKind::Formulario, &id, &json!({ "atencion_id": Uuid::new_v4().to_string() }))
            .await;
        assert_matches!(result, Err(ApiError::ValidationFailed { field_errors: Some(ref errors), .. }) if errors.contains_key("atencion_id"));
    }

    #[tokio::test]
    async fn permissions_upsert_per_module() {
        let store = MemoryStore::new();
        let config = AppConfig::development();
        let admin = caller(Role::Admin);
        let gateway = RecordGateway::new(&store, &config, &admin);
        let rol = Uuid::new_v4().to_string();
        let modulo = Uuid::new_v4().to_string();

        gateway
            .upsert_permissions(&rol, &json!([{ "modulo_id": modulo, "puede_ver": true }]))
            .await
            .unwrap();
        let rows = gateway
            .upsert_permissions(&rol, &json!({ "permisos": [{ "modulo_id": modulo, "puede_editar": true }] }))
            .await
            .unwrap();
        assert_eq!(rows[0]["puede_editar"], json!(true));
        assert_eq!(rows[0]["puede_ver"], json!(false));
        assert_eq!(store.rows("permisos").await.len(), 1);

        let pedagogo = caller(Role::Pedagogo);
        let denied = RecordGateway::new(&store, &config, &pedagogo)
            .upsert_permissions(&rol, &json!([]))
            .await;
        assert_matches!(denied, Err(ApiError::Forbidden(_)));
    }
}
