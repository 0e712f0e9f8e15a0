//! OpenAPI schema aggregation for the admin API.
//!
//! # Purpose
//! Collects every route and schema type into the document served at
//! `/v1/openapi.json`.
use crate::api::types::{
    ErrorResponse, HealthStatus, LoginResponse, SessionResponse, UserCreateRequest,
    UserListResponse, UserPatchRequest,
};
use crate::api::{system, users};
use crate::auth::idp_registry::IdpIssuerConfig;
use crate::auth::jwks::{self, JwkResponse, JwksResponse};
use crate::auth::{login, session};
use crate::model::{Organization, OrganizationStatus, User};
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "atrium-admin-api",
        version = "v1",
        description = "Atrium admin platform API"
    ),
    paths(
        system::system_health,
        login::login,
        login::logout,
        session::current_session,
        jwks::credential_jwks,
        users::list_users,
        users::create_user,
        users::update_user
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        LoginResponse,
        SessionResponse,
        JwkResponse,
        JwksResponse,
        User,
        UserCreateRequest,
        UserPatchRequest,
        UserListResponse,
        Organization,
        OrganizationStatus,
        IdpIssuerConfig
    )),
    tags(
        (name = "system", description = "Health endpoints"),
        (name = "auth", description = "Login, session and credential keys"),
        (name = "admin", description = "User provisioning")
    )
)]
pub struct ApiDoc;

pub(crate) async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
