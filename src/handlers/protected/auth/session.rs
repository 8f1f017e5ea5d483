use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
    Extension,
};
use serde_json::json;

use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::types::Identity;

/// GET /api/auth/whoami - The identity the session resolved to
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "user_id": "uuid",
///     "email": "medico@inami.example",
///     "nombre_completo": "Dra. Ana Lopez",
///     "role": "medico"
///   }
/// }
/// ```
pub async fn whoami(Extension(identity): Extension<Identity>) -> ApiResult<Identity> {
    Ok(ApiResponse::success(identity))
}

/// DELETE /api/auth/session - Clear the session cookie.
///
/// Works without a valid session so an expired cookie can always be removed.
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        state.config.session.cookie_name
    );
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        ApiResponse::success(json!({ "logged_out": true })),
    )
}
