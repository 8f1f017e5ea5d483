//! Collection handlers shared by every resource.
//!
//! The router mounts these once per collection and attaches the
//! [`ResourceKind`] as a request extension, so one handler set serves
//! `/api/jovenes`, `/api/atenciones`, `/api/centros` and the rest.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use serde_json::Value;
use std::collections::HashMap;

use crate::database::Row;
use crate::middleware::{ApiResponse, ApiResult};
use crate::resources::ResourceKind;
use crate::state::AppState;
use crate::types::Identity;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers.get(IDEMPOTENCY_HEADER).and_then(|v| v.to_str().ok())
}

/// GET /api/<collection> - List records, filtered by query parameters
pub async fn list(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<Row>> {
    let rows = state.gateway(&identity).list(kind, &params).await?;
    Ok(ApiResponse::success(rows))
}

/// GET /api/<collection>/:id - Get a single record, keyed by the resource name
pub async fn get(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Row> {
    let row = state.gateway(&identity).get(kind, &id).await?;
    Ok(ApiResponse::keyed(kind.def().singular, row))
}

/// POST /api/<collection> - Create a record.
///
/// An `Idempotency-Key` header makes retries of the same submission return
/// the first result. On `/api/atenciones` an optional `formulario` object is
/// created together with the attention.
pub async fn create(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Row> {
    let Json(mut body) = body?;
    let gateway = state.gateway(&identity);
    let key = idempotency_key(&headers);

    let form = match (kind, &mut body) {
        (ResourceKind::Atencion, Value::Object(map)) => map.remove("formulario").filter(|f| !f.is_null()),
        _ => None,
    };

    let created = match form {
        Some(form) => gateway.create_linked(&body, &form, key).await?,
        None => gateway.create(kind, &body, key).await?,
    };

    Ok(if created.replayed {
        ApiResponse::success(created.row)
    } else {
        ApiResponse::created(created.row)
    })
}

/// PUT /api/<collection>/:id - Partial update of the fields present in the body
pub async fn update(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Row> {
    let Json(body) = body?;
    let row = state.gateway(&identity).update(kind, &id, &body).await?;
    Ok(ApiResponse::success(row))
}

/// DELETE /api/<collection>/:id - Hard delete; returns the removed rows
pub async fn delete(
    State(state): State<AppState>,
    Extension(kind): Extension<ResourceKind>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Row>> {
    let rows = state.gateway(&identity).delete(kind, &id).await?;
    Ok(ApiResponse::success(rows))
}

