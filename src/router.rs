use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::handlers::{protected, public};
use crate::middleware::{session_middleware, timeout_envelope};
use crate::resources::ResourceKind;
use crate::state::AppState;

/// Full application router with the middleware stack applied
pub fn app(state: AppState) -> Router {
    let api = &state.config.api;
    let timeout = Duration::from_secs(api.request_timeout_secs);
    let body_limit = api.max_request_size_bytes;
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/api/auth/session", delete(protected::auth::session_logout))
        // Protected
        .merge(protected_routes(state.clone()))
        .with_state(state)
        // Global middleware; the first layer listed is the outermost
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                        user_id = tracing::field::Empty,
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::map_response(timeout_envelope))
                .layer(TimeoutLayer::new(timeout))
                .layer(cors),
        )
        .layer(DefaultBodyLimit::max(body_limit))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/whoami", get(protected::auth::session_whoami))
        .merge(collection("/api/jovenes", ResourceKind::Joven))
        .merge(collection("/api/atenciones", ResourceKind::Atencion))
        .merge(collection("/api/formularios", ResourceKind::Formulario))
        .merge(collection("/api/usuarios", ResourceKind::Usuario))
        .merge(collection("/api/roles", ResourceKind::Rol))
        .merge(collection("/api/modulos", ResourceKind::Modulo))
        .merge(collection("/api/centros", ResourceKind::Centro))
        .merge(collection("/api/notificaciones", ResourceKind::Notificacion))
        .merge(
            Router::new()
                .route("/api/permisos", get(protected::records::list))
                .layer(Extension(ResourceKind::Permiso)),
        )
        .route("/api/roles/:id/permisos", put(protected::admin::permisos_put))
        .route("/api/notificaciones/leer-todas", post(protected::notifications::leer_todas))
        .route("/api/notificaciones/:id/leer", post(protected::notifications::leer))
        // route_layer so unknown paths stay 404 instead of 401
        .route_layer(middleware::from_fn_with_state(state, session_middleware))
}

/// Collection and record routes for one resource
fn collection(path: &str, kind: ResourceKind) -> Router<AppState> {
    use protected::records;

    Router::new()
        .route(path, get(records::list).post(records::create))
        .route(
            &format!("{}/:id", path),
            get(records::get).put(records::update).delete(records::delete),
        )
        .layer(Extension(kind))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // Credentialed CORS cannot use a wildcard origin
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| {
            let wildcard = o.trim() == "*";
            if wildcard {
                tracing::warn!("ignoring wildcard CORS origin; list explicit origins instead");
            }
            !wildcard
        })
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("idempotency-key"),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
}
