//! HTTP API request/response types.
//!
//! # Purpose
//! Shared payload shapes for the admin API and OpenAPI schema generation.
use crate::model::User;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Short code such as `unauthorized` or `forbidden`.
    pub error: String,
    /// Machine-readable cause such as `missing_token`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub storage_backend: String,
    pub durable_storage: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct LoginResponse {
    pub session_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: String,
    pub customer_type: String,
    pub visible_organizations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: String,
    pub customer_type: String,
    pub allowed_actions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserCreateRequest {
    pub external_subject_id: String,
    pub email: Option<String>,
    /// Canonical role, or a legacy alias such as `contributor`.
    pub role: String,
    /// Defaults to the caller's customer type.
    pub customer_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
pub struct UserPatchRequest {
    pub role: Option<String>,
    pub customer_type: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub items: Vec<User>,
}
