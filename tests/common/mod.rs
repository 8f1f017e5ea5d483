#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use inami_api::auth::{issue_session_token, Claims};
use inami_api::config::AppConfig;
use inami_api::database::{MemoryStore, RecordStore};
use inami_api::router::app;
use inami_api::state::AppState;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const CENTRO_ID: &str = "5b0c6f1e-8a7d-4c2b-9e3f-1a2b3c4d5e6f";

/// The API served in-process on a free port, backed by the in-memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub config: AppConfig,
    client: reqwest::Client,
}

pub struct TestUser {
    pub id: Uuid,
    pub cookie: String,
}

impl TestServer {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(MemoryStore::new()).await
    }

    pub async fn spawn_with(store: MemoryStore) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = AppConfig::development();
        config.api.port = port;
        config.session.jwt_secret = JWT_SECRET.to_string();

        let store = Arc::new(store);
        store
            .seed(
                "centros",
                [json!({ "id": CENTRO_ID, "nombre": "Centro Norte", "activo": true })
                    .as_object()
                    .cloned()
                    .context("centro row")?],
            )
            .await;

        let state = AppState::new(store.clone() as Arc<dyn RecordStore>, config.clone());
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test port")?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app(state)).await;
        });

        let server = Self { port, base_url, store, config, client: reqwest::Client::new() };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(format!("{}/health", self.base_url)).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    /// Seed a profile with the given role and mint its session cookie
    pub async fn user(&self, rol: &str) -> TestUser {
        let id = Uuid::new_v4();
        let email = format!("{}@inami.example", rol);
        let profile = json!({
            "id": id.to_string(),
            "email": email,
            "nombre_completo": format!("Usuario {}", rol),
            "rol": rol,
        });
        self.store
            .seed("profiles", [profile.as_object().cloned().unwrap_or_default()])
            .await;
        TestUser { id, cookie: self.cookie_for(id) }
    }

    /// Session cookie for any subject, profile or not
    pub fn cookie_for(&self, id: Uuid) -> String {
        let claims = Claims::new(id, None, chrono::Duration::hours(1));
        let token = issue_session_token(&claims, JWT_SECRET).unwrap_or_default();
        format!("{}={}", self.config.session.cookie_name, token)
    }

    pub fn request(&self, method: Method, path: &str, user: Option<&TestUser>) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match user {
            Some(user) => builder.header(reqwest::header::COOKIE, &user.cookie),
            None => builder,
        }
    }

    pub fn get(&self, path: &str, user: &TestUser) -> RequestBuilder {
        self.request(Method::GET, path, Some(user))
    }

    pub fn post(&self, path: &str, user: &TestUser, body: &Value) -> RequestBuilder {
        self.request(Method::POST, path, Some(user)).json(body)
    }

    pub fn put(&self, path: &str, user: &TestUser, body: &Value) -> RequestBuilder {
        self.request(Method::PUT, path, Some(user)).json(body)
    }

    pub fn delete(&self, path: &str, user: &TestUser) -> RequestBuilder {
        self.request(Method::DELETE, path, Some(user))
    }
}

/// Send and decode the JSON envelope
pub async fn send(builder: RequestBuilder) -> Result<(StatusCode, Value)> {
    let resp = builder.send().await?;
    let status = resp.status();
    let body = resp.json::<Value>().await?;
    Ok((status, body))
}

pub fn joven_body() -> Value {
    json!({
        "nombres": "Ana",
        "apellidos": "Lopez",
        "fecha_nacimiento": "2008-05-01",
        "centro_id": CENTRO_ID,
        "fecha_ingreso": "2024-01-10"
    })
}

pub fn atencion_body(joven_id: &str) -> Value {
    json!({
        "joven_id": joven_id,
        "tipo_atencion": "psicologica",
        "fecha_atencion": "2024-03-01T10:00:00Z",
        "motivo": "Evaluacion inicial"
    })
}
