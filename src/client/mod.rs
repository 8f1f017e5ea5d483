//! Client side of the record API.
//!
//! [`FormController`] drives one create or edit form against any
//! [`RecordClient`]; [`HttpRecordClient`] is the HTTP implementation.

pub mod http;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::database::Row;
use crate::resources::{fields::is_blank, FieldErrors, ResourceKind};

pub use http::HttpRecordClient;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a failure envelope
    #[error("{message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        field_errors: FieldErrors,
        details: Option<String>,
    },

    /// Client-side validation failed; nothing was sent
    #[error("Please correct the highlighted fields")]
    Invalid(FieldErrors),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn field_errors(&self) -> FieldErrors {
        match self {
            ClientError::Api { field_errors, .. } | ClientError::Invalid(field_errors) => field_errors.clone(),
            _ => FieldErrors::new(),
        }
    }
}

/// Record operations a form needs from the server
#[async_trait]
pub trait RecordClient: Send + Sync {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<Row, ClientError>;

    async fn list(&self, kind: ResourceKind, params: &[(&str, &str)]) -> Result<Vec<Row>, ClientError>;

    async fn create(&self, kind: ResourceKind, body: &Value, idempotency_key: &str) -> Result<Row, ClientError>;

    async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Row, ClientError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Vec<Row>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Idle,
    Loading,
    Ready,
    LoadError(String),
    Submitting,
    SubmitSuccess,
    SubmitError,
}

/// Failure shown inline next to the form until dismissed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineError {
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormMode {
    New,
    Edit(String),
}

/// State machine behind one record form.
///
/// `Idle -> Loading -> Ready | LoadError`, then
/// `Ready -> Submitting -> SubmitSuccess | SubmitError`. A failed submit
/// keeps every entered value and shows the server's message and field
/// errors inline until [`FormController::dismiss_error`] or the next edit.
pub struct FormController<C: RecordClient> {
    client: C,
    kind: ResourceKind,
    mode: FormMode,
    state: FormState,
    fields: Map<String, Value>,
    original: Map<String, Value>,
    /// Read-only values derived from a related record (youth name, age, centre)
    context: Map<String, Value>,
    field_errors: FieldErrors,
    error: Option<InlineError>,
    /// One key per form instance: repeated submits of a new record create it once
    idempotency_key: String,
    saved: Option<Row>,
}

impl<C: RecordClient> FormController<C> {
    pub fn new(client: C, kind: ResourceKind) -> Self {
        Self {
            client,
            kind,
            mode: FormMode::New,
            state: FormState::Idle,
            fields: Map::new(),
            original: Map::new(),
            context: Map::new(),
            field_errors: FieldErrors::new(),
            error: None,
            idempotency_key: Uuid::new_v4().to_string(),
            saved: None,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn field_error(&self, name: &str) -> Option<&str> {
        self.field_errors.get(name).map(String::as_str)
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn error(&self) -> Option<&InlineError> {
        self.error.as_ref()
    }

    pub fn saved(&self) -> Option<&Row> {
        self.saved.as_ref()
    }

    /// Load a stored record and switch the form to edit mode
    pub async fn load_existing(&mut self, id: &str) -> Result<(), ClientError> {
        self.state = FormState::Loading;
        match self.client.fetch(self.kind, id).await {
            Ok(row) => {
                let def = self.kind.def();
                self.fields = row
                    .iter()
                    .filter(|(k, _)| def.field(k).is_some())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                self.original = self.fields.clone();
                self.mode = FormMode::Edit(id.to_string());
                self.field_errors.clear();
                self.state = FormState::Ready;
                Ok(())
            }
            Err(err) => {
                self.state = FormState::LoadError(err.to_string());
                Err(err)
            }
        }
    }

    /// Pre-fill a new form from the selected youth: links `joven_id` and
    /// exposes the youth's name, age and centre as read-only context
    pub async fn prefill_from_joven(&mut self, joven_id: &str) -> Result<(), ClientError> {
        self.state = FormState::Loading;
        match self.client.fetch(ResourceKind::Joven, joven_id).await {
            Ok(joven) => {
                let text = |k: &str| joven.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
                let nombre = format!("{} {}", text("nombres"), text("apellidos")).trim().to_string();
                self.context.insert("joven_nombre".to_string(), Value::String(nombre));
                self.context.insert("edad".to_string(), joven.get("edad").cloned().unwrap_or(Value::Null));
                self.context.insert("centro_id".to_string(), joven.get("centro_id").cloned().unwrap_or(Value::Null));
                if self.kind.def().field("joven_id").is_some() {
                    self.fields.insert("joven_id".to_string(), Value::String(joven_id.to_string()));
                }
                self.state = FormState::Ready;
                Ok(())
            }
            Err(err) => {
                self.state = FormState::LoadError(err.to_string());
                Err(err)
            }
        }
    }

    /// Record an edit; clears that field's error
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
        self.field_errors.remove(name);
        if matches!(self.state, FormState::Idle) {
            self.state = FormState::Ready;
        }
    }

    /// Required-field presence check; errors are kept per field
    pub fn validate(&mut self) -> bool {
        let def = self.kind.def();
        for name in def.required {
            let blank = is_blank(self.fields.get(*name));
            let checked = match self.mode {
                FormMode::New => true,
                FormMode::Edit(_) => self.fields.contains_key(*name),
            };
            if checked && blank {
                self.field_errors.insert(name.to_string(), "This field is required".to_string());
            }
        }
        self.field_errors.is_empty()
    }

    fn changed_fields(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(k, v)| self.original.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Submit the form: the full field set for a new record, only changed
    /// fields for an existing one
    pub async fn submit(&mut self) -> Result<Row, ClientError> {
        if !self.validate() {
            let err = ClientError::Invalid(self.field_errors.clone());
            self.fail(&err);
            return Err(err);
        }

        self.state = FormState::Submitting;
        self.error = None;

        let result = match &self.mode {
            FormMode::New => {
                let body = Value::Object(self.fields.clone());
                self.client.create(self.kind, &body, &self.idempotency_key).await
            }
            FormMode::Edit(id) => {
                let changes = self.changed_fields();
                if changes.is_empty() {
                    match &self.saved {
                        Some(row) => Ok(row.clone()),
                        None => self.client.fetch(self.kind, id).await,
                    }
                } else {
                    self.client.update(self.kind, id, &Value::Object(changes)).await
                }
            }
        };

        match result {
            Ok(row) => {
                // Once created, later submits edit the stored row
                if let (FormMode::New, Some(id)) = (&self.mode, row.get("id").and_then(Value::as_str)) {
                    self.mode = FormMode::Edit(id.to_string());
                }
                if let FormMode::Edit(_) = self.mode {
                    self.original = self.fields.clone();
                }
                self.saved = Some(row.clone());
                self.field_errors.clear();
                self.state = FormState::SubmitSuccess;
                Ok(row)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: &ClientError) {
        self.field_errors.extend(err.field_errors());
        let details = match err {
            ClientError::Api { details, .. } => details.clone(),
            _ => None,
        };
        self.error = Some(InlineError { message: err.to_string(), details });
        self.state = FormState::SubmitError;
    }

    /// Hide the inline error; entered values and field errors stay
    pub fn dismiss_error(&mut self) {
        self.error = None;
        if self.state == FormState::SubmitError {
            self.state = FormState::Ready;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every call; creates are deduplicated by idempotency key
    #[derive(Default)]
    struct FakeClient {
        rows: Mutex<HashMap<String, Row>>,
        by_key: Mutex<HashMap<String, String>>,
        calls: Mutex<Vec<String>>,
        reject_create: Option<FieldErrors>,
    }

    fn obj(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[async_trait]
    impl RecordClient for FakeClient {
        async fn fetch(&self, _kind: ResourceKind, id: &str) -> Result<Row, ClientError> {
            self.calls.lock().unwrap().push(format!("fetch {id}"));
            self.rows.lock().unwrap().get(id).cloned().ok_or(ClientError::Api {
                status: 404,
                code: "NOT_FOUND".into(),
                message: "not found".into(),
                field_errors: FieldErrors::new(),
                details: None,
            })
        }

        async fn list(&self, _kind: ResourceKind, _params: &[(&str, &str)]) -> Result<Vec<Row>, ClientError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn create(&self, _kind: ResourceKind, body: &Value, key: &str) -> Result<Row, ClientError> {
            self.calls.lock().unwrap().push("create".into());
            if let Some(errors) = &self.reject_create {
                return Err(ClientError::Api {
                    status: 400,
                    code: "VALIDATION_FAILED".into(),
                    message: "Invalid or missing fields".into(),
                    field_errors: errors.clone(),
                    details: None,
                });
            }
            if let Some(id) = self.by_key.lock().unwrap().get(key) {
                return Ok(self.rows.lock().unwrap()[id].clone());
            }
            let id = Uuid::new_v4().to_string();
            let mut row = obj(body.clone());
            row.insert("id".into(), json!(id));
            self.rows.lock().unwrap().insert(id.clone(), row.clone());
            self.by_key.lock().unwrap().insert(key.to_string(), id);
            Ok(row)
        }

        async fn update(&self, _kind: ResourceKind, id: &str, body: &Value) -> Result<Row, ClientError> {
            self.calls.lock().unwrap().push(format!("update {body}"));
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(id).ok_or_else(|| ClientError::Decode("missing".into()))?;
            for (k, v) in body.as_object().cloned().unwrap_or_default() {
                row.insert(k, v);
            }
            Ok(row.clone())
        }

        async fn delete(&self, _kind: ResourceKind, id: &str) -> Result<Vec<Row>, ClientError> {
            Ok(self.rows.lock().unwrap().remove(id).into_iter().collect())
        }
    }

    fn fill_joven(form: &mut FormController<FakeClient>) {
        form.set_field("nombres", "Ana");
        form.set_field("apellidos", "Lopez");
        form.set_field("fecha_nacimiento", "2008-05-01");
        form.set_field("centro_id", "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f50");
        form.set_field("fecha_ingreso", "2024-01-10");
    }

    #[tokio::test]
    async fn missing_required_fields_block_submit() {
        let mut form = FormController::new(FakeClient::default(), ResourceKind::Joven);
        form.set_field("nombres", "Ana");
        assert!(form.submit().await.is_err());
        assert_eq!(form.state(), &FormState::SubmitError);
        assert_eq!(form.field_error("apellidos"), Some("This field is required"));
        assert!(form.client.calls.lock().unwrap().is_empty());

        form.set_field("apellidos", "Lopez");
        assert_eq!(form.field_error("apellidos"), None);
    }

    #[tokio::test]
    async fn double_submit_creates_one_record() {
        let mut form = FormController::new(FakeClient::default(), ResourceKind::Joven);
        fill_joven(&mut form);
        let a = form.submit().await.unwrap();
        let b = form.submit().await.unwrap();
        assert_eq!(a["id"], b["id"]);
        assert_eq!(form.client.rows.lock().unwrap().len(), 1);
        assert_eq!(form.state(), &FormState::SubmitSuccess);
    }

    #[tokio::test]
    async fn retry_after_failed_create_reuses_the_key() {
        let mut form = FormController::new(FakeClient::default(), ResourceKind::Joven);
        fill_joven(&mut form);
        let key = form.idempotency_key.clone();
        let first = form.client.create(ResourceKind::Joven, &Value::Object(form.fields.clone()), &key).await.unwrap();
        // The response never reached the form; its retry must not duplicate the row
        let row = form.submit().await.unwrap();
        assert_eq!(row["id"], first["id"]);
        assert_eq!(form.client.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edits_after_create_update_the_new_record() {
        let mut form = FormController::new(FakeClient::default(), ResourceKind::Joven);
        fill_joven(&mut form);
        let created = form.submit().await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        form.set_field("apellidos", "Perez");
        let updated = form.submit().await.unwrap();
        assert_eq!(form.state(), &FormState::SubmitSuccess);
        assert_eq!(updated["id"], json!(id));
        assert_eq!(updated["apellidos"], json!("Perez"));
        assert_eq!(form.client.rows.lock().unwrap()[&id]["apellidos"], json!("Perez"));
        let calls = form.client.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["create".to_string(), r#"update {"apellidos":"Perez"}"#.to_string()]);
    }

    #[tokio::test]
    async fn server_errors_stay_inline_and_dismissible() {
        let mut errors = FieldErrors::new();
        errors.insert("centro_id".into(), "invalid id".into());
        let client = FakeClient { reject_create: Some(errors), ..Default::default() };
        let mut form = FormController::new(client, ResourceKind::Joven);
        fill_joven(&mut form);

        assert!(form.submit().await.is_err());
        assert_eq!(form.error().map(|e| e.message.as_str()), Some("Invalid or missing fields"));
        assert_eq!(form.field_error("centro_id"), Some("invalid id"));
        // entered values survive the failure
        assert_eq!(form.fields()["nombres"], json!("Ana"));

        form.dismiss_error();
        assert!(form.error().is_none());
        assert_eq!(form.state(), &FormState::Ready);
    }

    #[tokio::test]
    async fn edit_sends_only_changed_fields() {
        let client = FakeClient::default();
        let id = "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f51";
        client.rows.lock().unwrap().insert(
            id.into(),
            obj(json!({ "id": id, "nombres": "Ana", "apellidos": "Lopez", "created_at": "2024-01-01" })),
        );
        let mut form = FormController::new(client, ResourceKind::Joven);
        form.load_existing(id).await.unwrap();
        assert_eq!(form.state(), &FormState::Ready);
        assert!(form.fields().get("created_at").is_none());

        form.set_field("apellidos", "Perez");
        form.submit().await.unwrap();
        let calls = form.client.calls.lock().unwrap().clone();
        assert_eq!(calls.last().unwrap(), r#"update {"apellidos":"Perez"}"#);
    }

    #[tokio::test]
    async fn load_failure_is_reported() {
        let mut form = FormController::new(FakeClient::default(), ResourceKind::Atencion);
        assert!(form.load_existing("7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f52").await.is_err());
        assert!(matches!(form.state(), FormState::LoadError(_)));
    }

    #[tokio::test]
    async fn prefill_links_youth_and_exposes_context() {
        let client = FakeClient::default();
        let joven = "7f8e2a4c-1d3b-4c5e-9f6a-0b1c2d3e4f53";
        client.rows.lock().unwrap().insert(
            joven.into(),
            obj(json!({ "id": joven, "nombres": "Ana", "apellidos": "Lopez", "edad": 16, "centro_id": "c1" })),
        );
        let mut form = FormController::new(client, ResourceKind::Atencion);
        form.prefill_from_joven(joven).await.unwrap();
        assert_eq!(form.fields()["joven_id"], json!(joven));
        assert_eq!(form.context()["joven_nombre"], json!("Ana Lopez"));
        assert_eq!(form.context()["edad"], json!(16));
    }
}
