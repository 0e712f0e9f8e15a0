//! Per-request authorization from the internal credential.
//!
//! # Purpose
//! Provides the [`Authorized`] extractor used by every protected handler and
//! the session introspection endpoint.
//!
//! # Key invariants
//! - The `Authorization: Bearer` header wins over the `session_token` cookie.
//! - No state is kept between requests; the context comes from the
//!   credential alone.
use crate::api::error::ApiError;
use crate::api::types::SessionResponse;
use crate::app::AppState;
use atrium_authz::{AuthorizationContext, allowed_actions};
use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use cookie::{Cookie, CookieJar};

pub const SESSION_COOKIE: &str = "session_token";

/// Verified caller context, extracted from the request credential.
#[derive(Debug, Clone)]
pub struct Authorized(pub AuthorizationContext);

#[axum::async_trait]
impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = match bearer_token(&parts.headers) {
            Some(bearer) => Some(bearer.to_string()),
            None => session_cookie(&parts.headers),
        };
        state
            .orchestrator
            .authorize_request(credential.as_deref())
            .map(Authorized)
            .map_err(ApiError::from)
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

/// Value of the `session_token` cookie. Malformed cookie pairs are skipped
/// rather than failing the whole header.
pub(crate) fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let jar = parse_cookies(headers);
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_cookies(headers: &HeaderMap) -> CookieJar {
    let mut jar = CookieJar::new();
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for pair in raw.split(';').map(str::trim).filter(|pair| !pair.is_empty()) {
            if let Ok(cookie) = Cookie::parse(pair) {
                jar.add_original(cookie.into_owned());
            }
        }
    }
    jar
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    tag = "auth",
    responses(
        (status = 200, description = "Current session context", body = SessionResponse),
        (status = 401, description = "Missing, invalid or expired credential", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn current_session(Authorized(context): Authorized) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: context.user_id,
        organization_id: context.organization_id,
        role: context.role.as_str().to_string(),
        customer_type: context.customer_type.as_str().to_string(),
        allowed_actions: allowed_actions(context.role)
            .into_iter()
            .map(|action| action.as_str().to_string())
            .collect(),
    })
}
