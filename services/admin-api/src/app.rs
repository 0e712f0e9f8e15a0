//! Admin API HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
use crate::api;
use crate::auth;
use crate::auth::orchestrator::LoginOrchestrator;
use crate::observability;
use crate::store::IdentityStore;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub orchestrator: Arc<LoginOrchestrator>,
    /// `Secure; SameSite=None` session cookies (production only).
    pub secure_cookies: bool,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route("/v1/auth/login", axum::routing::post(auth::login::login))
        .route("/v1/auth/logout", axum::routing::post(auth::login::logout))
        .route(
            "/v1/auth/session",
            axum::routing::get(auth::session::current_session),
        )
        .route(
            "/v1/auth/.well-known/jwks.json",
            axum::routing::get(auth::jwks::credential_jwks),
        )
        .route(
            "/v1/admin/users",
            axum::routing::get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/v1/admin/users/:user_id",
            axum::routing::patch(api::users::update_user),
        )
        .route(
            "/v1/openapi.json",
            axum::routing::get(api::openapi::openapi_json),
        )
        .layer(trace_layer)
        .with_state(state)
}
