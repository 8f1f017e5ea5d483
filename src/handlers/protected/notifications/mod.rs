use axum::{
    extract::{Path, State},
    Extension,
};

use crate::database::Row;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::types::Identity;

/// POST /api/notificaciones/:id/leer - Mark one notification read
pub async fn leer(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Row> {
    let row = state.gateway(&identity).mark_read(&id).await?;
    Ok(ApiResponse::success(row))
}

/// POST /api/notificaciones/leer-todas - Mark all of the caller's notifications read
pub async fn leer_todas(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<Row>> {
    let rows = state.gateway(&identity).mark_all_read().await?;
    Ok(ApiResponse::success(rows))
}
