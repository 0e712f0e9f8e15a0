//! API error types and helpers.
//!
//! # Purpose
//! Keeps every error payload in the `{ error, reason?, message }` shape and
//! maps login failures and store errors onto HTTP statuses.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
//! - Messages never echo tokens or claim values.
use crate::api::types::ErrorResponse;
use crate::auth::orchestrator::AuthFailure;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Status code plus JSON body; `status` must match `body.error`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, reason: Option<&str>, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                reason: reason.map(str::to_string),
                message: message.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        let reason = failure.reason();
        match &failure {
            AuthFailure::MissingToken => api_unauthorized(reason, "authentication required"),
            AuthFailure::InvalidToken => api_unauthorized(reason, "token is not valid"),
            AuthFailure::TokenExpired => api_unauthorized(reason, "token has expired"),
            AuthFailure::PolicyDenied(deny) => api_forbidden(reason, deny.message()),
            AuthFailure::UserNotProvisioned => {
                api_forbidden(reason, "user is not provisioned for this platform")
            }
            AuthFailure::OrganizationInactive => {
                api_forbidden(reason, "organization is not active")
            }
            AuthFailure::ProvisioningIncomplete => {
                api_internal_message(reason, "user profile is incomplete")
            }
            AuthFailure::Store(_) | AuthFailure::Signing(_) => {
                api_internal_message(reason, "authentication failed")
            }
        }
    }
}

pub fn api_unauthorized(reason: &str, message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", Some(reason), message)
}

pub fn api_forbidden(reason: &str, message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", Some(reason), message)
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", None, message)
}

pub fn api_conflict(message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, "conflict", None, message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", None, message)
}

/// 500 from a store error. The error itself is only logged.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "identity storage error");
    api_internal_message("internal_server_error", message)
}

pub fn api_internal_message(reason: &str, message: &str) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_server_error",
        Some(reason),
        message,
    )
}

/// Map a store error from an admin operation. Not-found and conflict are
/// client errors named after the resource the store reported; anything else
/// is internal and answered with `failure`.
pub fn api_store_error(failure: &str, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(resource) => api_not_found(&format!("{resource} not found")),
        StoreError::Conflict(resource) => api_conflict(&format!("{resource} already exists")),
        other => api_internal(failure, &other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_authz::DenyReason;

    #[test]
    fn api_error_helpers_build_expected_codes() {
        let unauthorized = api_unauthorized("missing_token", "nope");
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unauthorized.body.error, "unauthorized");
        assert_eq!(unauthorized.body.reason.as_deref(), Some("missing_token"));

        let forbidden = api_forbidden("insufficient_role", "nope");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden.body.error, "forbidden");

        let not_found = api_not_found("missing");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert!(not_found.body.reason.is_none());

        let conflict = api_conflict("exists");
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert_eq!(conflict.body.error, "conflict");

        let validation = api_validation_error("bad");
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.body.error, "validation_error");
    }

    #[test]
    fn auth_failures_map_to_statuses() {
        let cases = vec![
            (AuthFailure::MissingToken, StatusCode::UNAUTHORIZED),
            (AuthFailure::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthFailure::TokenExpired, StatusCode::UNAUTHORIZED),
            (
                AuthFailure::PolicyDenied(DenyReason::PartnerMissingOrg),
                StatusCode::FORBIDDEN,
            ),
            (AuthFailure::UserNotProvisioned, StatusCode::FORBIDDEN),
            (AuthFailure::OrganizationInactive, StatusCode::FORBIDDEN),
            (
                AuthFailure::ProvisioningIncomplete,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (failure, status) in cases {
            let reason = failure.reason();
            let api = ApiError::from(failure);
            assert_eq!(api.status, status);
            assert_eq!(api.body.reason.as_deref(), Some(reason));
        }
    }

    #[test]
    fn store_errors_map_to_client_or_internal() {
        let missing_org = api_store_error(
            "failed to create user",
            StoreError::NotFound("organization".into()),
        );
        assert_eq!(missing_org.status, StatusCode::NOT_FOUND);
        assert_eq!(missing_org.body.message, "organization not found");

        let missing_user =
            api_store_error("failed to update user", StoreError::NotFound("user".into()));
        assert_eq!(missing_user.body.message, "user not found");

        let taken = api_store_error("failed to create user", StoreError::Conflict("user".into()));
        assert_eq!(taken.status, StatusCode::CONFLICT);
        assert_eq!(taken.body.message, "user already exists");

        let internal = api_store_error(
            "storage failed",
            StoreError::Unexpected(anyhow::anyhow!("boom")),
        );
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.body.message, "storage failed");
        assert_eq!(
            internal.body.reason.as_deref(),
            Some("internal_server_error")
        );
    }
}
