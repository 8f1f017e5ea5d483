use axum::{
    extract::{Request, State},
    http::{header::COOKIE, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{cookie_value, verify_session_token, SessionError};
use crate::error::ApiError;
use crate::resources::{ResourceKind, Role};
use crate::state::AppState;
use crate::types::{Access, Identity};

/// Session middleware: resolves the caller from the session cookie and
/// their profile row, then injects the [`Identity`] for handlers.
///
/// Runs on every protected request; nothing is cached between requests.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve_session(&state, request.headers()).await.map_err(|err| match err {
        SessionError::ProfileLookup(store_err) => ApiError::from(store_err),
        SessionError::MissingToken => ApiError::unauthenticated("Authentication required"),
        other => {
            debug!(error = %other, "session rejected");
            ApiError::unauthenticated(other.to_string())
        }
    })?;

    tracing::Span::current().record("user_id", tracing::field::display(identity.user_id));
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Resolve the session cookie to an identity
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<Identity, SessionError> {
    let cookie_name = &state.config.session.cookie_name;
    let token = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| cookie_value(h, cookie_name))
        .ok_or(SessionError::MissingToken)?;

    let claims = verify_session_token(token, &state.config.session)?;

    // Callers may always read their own profile under row-level rules
    let profile = state
        .store
        .fetch(Access::Normal { user_id: claims.sub }, ResourceKind::Usuario.table(), claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "session subject has no profile");
            SessionError::ProfileNotFound(claims.sub)
        })?;

    let text = |key: &str| profile.get(key).and_then(Value::as_str).map(str::to_string);

    let role: Role = text("rol")
        .ok_or_else(|| SessionError::InvalidProfile(claims.sub, "missing rol".to_string()))?
        .parse()
        .map_err(|e| SessionError::InvalidProfile(claims.sub, e))?;

    Ok(Identity {
        user_id: claims.sub,
        email: text("email").or(claims.email).unwrap_or_default(),
        nombre_completo: text("nombre_completo").unwrap_or_default(),
        role,
    })
}
