use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::{ClientError, RecordClient};
use crate::config::{ClientConfig, SessionConfig};
use crate::database::Row;
use crate::resources::{FieldErrors, ResourceKind};

/// [`RecordClient`] over the HTTP API, authenticated by the session cookie
#[derive(Debug, Clone)]
pub struct HttpRecordClient {
    http: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
    list_timeout: Duration,
    list_fallback: Duration,
}

impl HttpRecordClient {
    pub fn new(config: &ClientConfig, session: &SessionConfig, token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: token.map(|t| format!("{}={}", session.cookie_name, t)),
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            list_fallback: Duration::from_secs(config.list_fallback_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    fn collection_path(kind: ResourceKind) -> String {
        format!("/api/{}", kind.def().plural)
    }

    fn record_path(kind: ResourceKind, id: &str) -> String {
        format!("/api/{}/{}", kind.def().plural, id)
    }

    /// Send a request and unwrap the `{success, <key>}` envelope; only
    /// single-record reads use the resource name as key, the rest use `data`
    async fn send(&self, builder: RequestBuilder, key: &str) -> Result<Value, ClientError> {
        let response = builder.send().await.map_err(|e| self.transport(e))?;
        read_envelope(response, key).await
    }

    fn transport(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.list_timeout.as_secs())
        } else {
            ClientError::Transport(err)
        }
    }

    /// List with the UI fallback: a load still pending after the fallback
    /// window is reported as failed. The server request itself is not cancelled.
    pub async fn load_list_with_fallback(&self, kind: ResourceKind, params: &[(&str, &str)]) -> Result<Vec<Row>, ClientError> {
        match tokio::time::timeout(self.list_fallback, self.list(kind, params)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.list_fallback.as_secs())),
        }
    }

    pub async fn whoami(&self) -> Result<Value, ClientError> {
        self.send(self.request(Method::GET, "/api/auth/whoami"), "data").await
    }

    pub async fn mark_read(&self, id: &str) -> Result<Row, ClientError> {
        let value = self
            .send(self.request(Method::POST, &format!("/api/notificaciones/{}/leer", id)), "data")
            .await?;
        into_row(value)
    }

    pub async fn mark_all_read(&self) -> Result<Vec<Row>, ClientError> {
        let value = self
            .send(self.request(Method::POST, "/api/notificaciones/leer-todas"), "data")
            .await?;
        into_rows(value)
    }
}

#[async_trait]
impl RecordClient for HttpRecordClient {
    async fn fetch(&self, kind: ResourceKind, id: &str) -> Result<Row, ClientError> {
        let value = self
            .send(self.request(Method::GET, &Self::record_path(kind, id)), kind.def().singular)
            .await?;
        into_row(value)
    }

    async fn list(&self, kind: ResourceKind, params: &[(&str, &str)]) -> Result<Vec<Row>, ClientError> {
        let builder = self
            .request(Method::GET, &Self::collection_path(kind))
            .query(params)
            .timeout(self.list_timeout);
        into_rows(self.send(builder, "data").await?)
    }

    async fn create(&self, kind: ResourceKind, body: &Value, idempotency_key: &str) -> Result<Row, ClientError> {
        let builder = self
            .request(Method::POST, &Self::collection_path(kind))
            .header("Idempotency-Key", idempotency_key)
            .json(body);
        into_row(self.send(builder, "data").await?)
    }

    async fn update(&self, kind: ResourceKind, id: &str, body: &Value) -> Result<Row, ClientError> {
        let builder = self.request(Method::PUT, &Self::record_path(kind, id)).json(body);
        into_row(self.send(builder, "data").await?)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<Vec<Row>, ClientError> {
        let builder = self.request(Method::DELETE, &Self::record_path(kind, id));
        into_rows(self.send(builder, "data").await?)
    }
}

async fn read_envelope(response: Response, key: &str) -> Result<Value, ClientError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| ClientError::Decode(format!("{} (status {})", e, status)))?;
    envelope_value(status, body, key)
}

fn envelope_value(status: StatusCode, mut body: Value, key: &str) -> Result<Value, ClientError> {
    if status.is_success() && body.get("success") == Some(&Value::Bool(true)) {
        return body
            .get_mut(key)
            .map(Value::take)
            .ok_or_else(|| ClientError::Decode(format!("missing '{}' in response", key)));
    }

    let text = |k: &str| body.get(k).and_then(Value::as_str).map(str::to_string);
    let field_errors: FieldErrors = body
        .get("field_errors")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        code: text("code").unwrap_or_else(|| "UNKNOWN".to_string()),
        message: text("error").unwrap_or_else(|| format!("Request failed with status {}", status)),
        field_errors,
        details: text("details"),
    })
}

fn into_row(value: Value) -> Result<Row, ClientError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ClientError::Decode(format!("expected an object, got {}", other))),
    }
}

fn into_rows(value: Value) -> Result<Vec<Row>, ClientError> {
    match value {
        Value::Array(items) => items.into_iter().map(into_row).collect(),
        other => Err(ClientError::Decode(format!("expected an array, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn success_envelope_yields_keyed_value() {
        let body = json!({ "success": true, "joven": { "id": "x" } });
        let value = envelope_value(StatusCode::OK, body, "joven").unwrap();
        assert_eq!(value, json!({ "id": "x" }));
    }

    #[test]
    fn failure_envelope_carries_field_errors() {
        let body = json!({
            "success": false,
            "error": "Invalid or missing fields",
            "code": "VALIDATION_FAILED",
            "field_errors": { "motivo": "This field is required" }
        });
        let err = envelope_value(StatusCode::BAD_REQUEST, body, "atencion").unwrap_err();
        assert_matches!(&err, ClientError::Api { status: 400, code, .. } if code == "VALIDATION_FAILED");
        assert_eq!(err.to_string(), "Invalid or missing fields");
        assert_eq!(err.field_errors()["motivo"], "This field is required");
    }

    #[test]
    fn paths_follow_collection_names() {
        assert_eq!(HttpRecordClient::collection_path(ResourceKind::Atencion), "/api/atenciones");
        assert_eq!(HttpRecordClient::record_path(ResourceKind::Joven, "abc"), "/api/jovenes/abc");
    }
}
