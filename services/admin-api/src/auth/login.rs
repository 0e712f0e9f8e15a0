//! Login and logout endpoints.
//!
//! # Purpose
//! Exchange a verified IdP bearer for an internal credential, returned both
//! in the body and as an HTTP-only `session_token` cookie.
//!
//! # Security considerations
//! - The cookie is always `HttpOnly`. In production it is also `Secure` with
//!   `SameSite=None`; elsewhere it is `SameSite=Lax`.
//! - Logout only expires the cookie. Credentials are stateless and stay valid
//!   until `exp`.
use crate::api::error::ApiError;
use crate::api::types::LoginResponse;
use crate::app::AppState;
use crate::auth::session::{SESSION_COOKIE, bearer_token};
use axum::Json;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use cookie::{Cookie, SameSite};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "auth",
    responses(
        (status = 200, description = "Internal credential issued", body = LoginResponse),
        (status = 401, description = "Missing or invalid IdP token", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Denied by policy or not provisioned", body = crate::api::types::ErrorResponse),
        (status = 500, description = "Incomplete profile or internal failure", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.orchestrator.login(bearer_token(&headers)).await?;
    let expires_in = outcome.credential.expires_in_secs();
    let cookie = session_cookie(
        &outcome.credential.token,
        expires_in,
        state.secure_cookies,
    );
    let body = LoginResponse {
        session_token: outcome.credential.token,
        token_type: "Bearer".to_string(),
        expires_in,
        expires_at: outcome.credential.expires_at,
        user_id: outcome.context.user_id,
        organization_id: outcome.context.organization_id,
        role: outcome.context.role.as_str().to_string(),
        customer_type: outcome.context.customer_type.as_str().to_string(),
        visible_organizations: outcome.visibility.organizations(),
    };
    Ok(([(SET_COOKIE, cookie)], Json(body)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    responses((status = 204, description = "Session cookie cleared"))
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, session_cookie("", 0, state.secure_cookies))],
    )
}

pub(crate) fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let same_site = if secure {
        SameSite::None
    } else {
        SameSite::Lax
    };
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .path("/")
        .max_age(cookie::time::Duration::seconds(max_age_secs))
        .same_site(same_site)
        .secure(secure)
        .build()
        .to_string()
}
