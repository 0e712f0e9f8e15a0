//! Administrative user provisioning endpoints.
//!
//! # Purpose
//! Lets administrators pre-provision and manage users inside their own
//! organization, which is what strict login mode requires.
//!
//! # Key invariants
//! - Every operation is scoped by the caller's [`SessionVariables`]; users of
//!   other organizations are invisible and report `404`.
//! - Mutations consult the permission matrix for `user` resources.
//! - A caller can never grant a role whose actions exceed their own, and a
//!   partner caller can only assign the partner customer type.
//!
//! [`SessionVariables`]: atrium_authz::SessionVariables
use crate::api::error::{ApiError, api_forbidden, api_store_error, api_validation_error};
use crate::api::types::{UserCreateRequest, UserListResponse, UserPatchRequest};
use crate::app::AppState;
use crate::auth::session::Authorized;
use crate::model::{NewUser, User, UserAccessPatch};
use atrium_authz::{
    Action, AuthorizationContext, CanonicalRole, CustomerClass, ResourceKind, allowed_actions,
    can, normalize_role,
};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

const INSUFFICIENT_ROLE: &str = "insufficient_role";

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    tag = "admin",
    responses(
        (status = 200, description = "Users of the caller's organization", body = UserListResponse),
        (status = 401, description = "Not authenticated", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Authorized(context): Authorized,
) -> Result<Json<UserListResponse>, ApiError> {
    require(&context, Action::Read)?;
    let items = state
        .store
        .list_users(&context.session_variables())
        .await
        .map_err(|err| api_store_error("failed to list users", err))?;
    Ok(Json(UserListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/admin/users",
    tag = "admin",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid request", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Caller's organization no longer exists", body = crate::api::types::ErrorResponse),
        (status = 409, description = "External subject already provisioned", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Authorized(context): Authorized,
    Json(request): Json<UserCreateRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    require(&context, Action::Create)?;
    let external_subject_id = request.external_subject_id.trim();
    if external_subject_id.is_empty() {
        return Err(api_validation_error("external_subject_id must not be empty"));
    }
    let role = parse_role(&request.role)?;
    ensure_can_grant(&context, role)?;
    let customer_type = match request.customer_type.as_deref() {
        Some(value) => parse_customer_type(value)?,
        None => context.customer_type,
    };
    ensure_can_assign(&context, customer_type)?;

    let user = state
        .store
        .create_user(
            &context.session_variables(),
            NewUser {
                external_subject_id: external_subject_id.to_string(),
                email: request
                    .email
                    .map(|email| email.trim().to_string())
                    .filter(|email| !email.is_empty()),
                role,
                customer_type,
            },
        )
        .await
        .map_err(|err| api_store_error("failed to create user", err))?;
    tracing::info!(
        user_id = %user.id,
        organization_id = %context.organization_id,
        created_by = %context.user_id,
        role = %user.role,
        "user provisioned"
    );
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    patch,
    path = "/v1/admin/users/{user_id}",
    tag = "admin",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = UserPatchRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Invalid request", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::api::types::ErrorResponse),
        (status = 404, description = "User not found in the caller's organization", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Authorized(context): Authorized,
    Path(user_id): Path<String>,
    Json(request): Json<UserPatchRequest>,
) -> Result<Json<User>, ApiError> {
    require(&context, Action::Update)?;
    let user_id =
        Uuid::parse_str(&user_id).map_err(|_| api_validation_error("user_id must be a uuid"))?;
    let role = request.role.as_deref().map(parse_role).transpose()?;
    if let Some(role) = role {
        ensure_can_grant(&context, role)?;
    }
    let customer_type = request
        .customer_type
        .as_deref()
        .map(parse_customer_type)
        .transpose()?;
    if let Some(customer_type) = customer_type {
        ensure_can_assign(&context, customer_type)?;
    }

    let user = state
        .store
        .update_user_access(
            &context.session_variables(),
            user_id,
            UserAccessPatch {
                role,
                customer_type,
                is_active: request.is_active,
            },
        )
        .await
        .map_err(|err| api_store_error("failed to update user", err))?;
    tracing::info!(
        user_id = %user.id,
        updated_by = %context.user_id,
        role = %user.role,
        is_active = user.is_active,
        "user access updated"
    );
    Ok(Json(user))
}

fn require(context: &AuthorizationContext, action: Action) -> Result<(), ApiError> {
    if can(context.role, action, ResourceKind::User) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %context.user_id,
        role = %context.role,
        action = action.as_str(),
        "admin action refused"
    );
    Err(api_forbidden(
        INSUFFICIENT_ROLE,
        "role does not permit this action on users",
    ))
}

fn ensure_can_grant(context: &AuthorizationContext, role: CanonicalRole) -> Result<(), ApiError> {
    let held = allowed_actions(context.role);
    if allowed_actions(role)
        .iter()
        .all(|action| held.contains(action))
    {
        return Ok(());
    }
    Err(api_forbidden(
        INSUFFICIENT_ROLE,
        "cannot grant a role wider than your own",
    ))
}

fn ensure_can_assign(
    context: &AuthorizationContext,
    customer_type: CustomerClass,
) -> Result<(), ApiError> {
    if context.customer_type == CustomerClass::Partner && customer_type != CustomerClass::Partner {
        return Err(api_forbidden(
            INSUFFICIENT_ROLE,
            "partners can only provision partner users",
        ));
    }
    Ok(())
}

/// Canonical names and the legacy `creator`/`contributor` aliases; anything
/// else is rejected rather than silently downgraded to `viewer`.
fn parse_role(value: &str) -> Result<CanonicalRole, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "admin" | "approver" | "editor" | "viewer" | "creator" | "contributor" => {
            Ok(normalize_role(value))
        }
        _ => Err(api_validation_error(
            "role must be one of admin, approver, editor, viewer",
        )),
    }
}

fn parse_customer_type(value: &str) -> Result<CustomerClass, ApiError> {
    CustomerClass::parse(value).ok_or_else(|| {
        api_validation_error("customer_type must be one of staff, partner, enterprise")
    })
}
