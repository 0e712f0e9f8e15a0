//! JWKS endpoint for internal credential verification keys.
//!
//! # Purpose
//! Publish the Ed25519 public keys of the current and previous signing keys
//! so downstream services can verify internal credentials offline.
//!
//! # Key invariants
//! - Only public keys are exported; seeds never cross this interface.
//! - Keys are listed current first, then previous, so output is stable for
//!   a given configuration.
use crate::app::AppState;
use atrium_authz::Jwk;
use axum::Json;
use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JwkResponse {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: String,
}

impl From<Jwk> for JwkResponse {
    fn from(jwk: Jwk) -> Self {
        Self {
            kty: jwk.kty,
            crv: jwk.crv,
            x: jwk.x,
            kid: jwk.kid,
            alg: jwk.alg,
            use_field: jwk.use_field,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JwksResponse {
    pub keys: Vec<JwkResponse>,
}

#[utoipa::path(
    get,
    path = "/v1/auth/.well-known/jwks.json",
    tag = "auth",
    responses((status = 200, description = "Internal credential public keys", body = JwksResponse))
)]
pub async fn credential_jwks(State(state): State<AppState>) -> Json<JwksResponse> {
    let jwks = state.orchestrator.tokens().jwks();
    Json(JwksResponse {
        keys: jwks.keys.into_iter().map(JwkResponse::from).collect(),
    })
}
