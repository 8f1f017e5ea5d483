use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde_json::Value;

use crate::database::Row;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::types::Identity;

/// PUT /api/roles/:id/permisos - Set a role's permission flags per module
///
/// Body: `[{"modulo_id": "...", "puede_ver": true, "puede_crear": false, ...}]`
/// or `{"permisos": [...]}`. Returns the stored permission rows.
pub async fn permisos_put(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(role_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Vec<Row>> {
    let Json(body) = body?;
    let rows = state.gateway(&identity).upsert_permissions(&role_id, &body).await?;
    Ok(ApiResponse::success(rows))
}
