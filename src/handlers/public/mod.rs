// handlers/public/mod.rs - Handlers that need no session

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - Service information
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "INAMI Records API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Case records for youths, attentions and their form details",
            "endpoints": {
                "auth": "/api/auth/whoami, /api/auth/session",
                "jovenes": "/api/jovenes[/:id]",
                "atenciones": "/api/atenciones[/:id]",
                "formularios": "/api/formularios[/:id]",
                "centros": "/api/centros[/:id]",
                "notificaciones": "/api/notificaciones[/:id][/leer], /api/notificaciones/leer-todas",
                "admin": "/api/usuarios, /api/roles[/:id/permisos], /api/modulos, /api/permisos"
            }
        }
    }))
}

/// GET /health - Store connectivity
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "UPSTREAM_FAILURE",
                    "details": e.to_string()
                })),
            )
        }
    }
}
