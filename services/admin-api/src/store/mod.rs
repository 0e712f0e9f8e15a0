//! Identity storage abstraction.
//!
//! # Purpose
//! Defines the store contract used by the login orchestrator and the admin
//! endpoints, plus the shared error type.
//!
//! # Key invariants
//! - Sync provisioning (organization get-or-create plus user upsert) is one
//!   atomic unit in every backend.
//! - Uniqueness of organization names and external subject ids is the only
//!   concurrency guard; racing logins converge on the same rows.
//! - Admin reads and writes take an explicit [`SessionVariables`] scope and
//!   never see rows outside `current_organization_id`.
use crate::model::{
    NewUser, Organization, ProvisionOutcome, ProvisionRequest, User, UserAccessPatch,
};
use async_trait::async_trait;
use atrium_authz::SessionVariables;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Carries the missing resource, e.g. `"user"`.
    #[error("{0} not found")]
    NotFound(String),
    /// Carries the resource whose unique key is taken.
    #[error("{0} already exists")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            other => StoreError::Unexpected(other.into()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Sync provisioning: get-or-create the organization by name, then upsert
    /// the user by external subject id, in one transaction. An existing
    /// inactive organization or a deactivated user refuses the login before
    /// anything is written.
    async fn provision_identity(&self, request: ProvisionRequest) -> StoreResult<ProvisionOutcome>;

    async fn find_user_by_external_id(&self, external_subject_id: &str)
    -> StoreResult<Option<User>>;

    /// Refresh the login timestamp and, when present, the email.
    async fn record_login(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<User>;

    async fn get_organization(&self, organization_id: Uuid) -> StoreResult<Organization>;

    async fn create_user(&self, scope: &SessionVariables, user: NewUser) -> StoreResult<User>;
    async fn update_user_access(
        &self,
        scope: &SessionVariables,
        user_id: Uuid,
        patch: UserAccessPatch,
    ) -> StoreResult<User>;
    async fn list_users(&self, scope: &SessionVariables) -> StoreResult<Vec<User>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

pub(crate) fn scope_organization_id(scope: &SessionVariables) -> StoreResult<Uuid> {
    Uuid::parse_str(&scope.current_organization_id).map_err(|err| {
        StoreError::Unexpected(anyhow::anyhow!("invalid organization scope: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_row_not_found_maps_to_not_found() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unexpected(_)
        ));
    }

    #[test]
    fn scope_must_carry_an_organization_id() {
        let scope = SessionVariables {
            current_user_id: Uuid::new_v4().to_string(),
            current_organization_id: "not-a-uuid".to_string(),
            current_role: "admin".to_string(),
            current_customer_type: "staff".to_string(),
        };
        assert!(scope_organization_id(&scope).is_err());
    }
}
