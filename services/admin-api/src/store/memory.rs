//! In-memory implementation of the identity store.
//!
//! # Purpose
//! Backs local development and the HTTP integration tests without any
//! external dependency. State is lost on restart.
//!
//! # Consistency
//! All identity tables sit behind a single `tokio::sync::RwLock`, so sync
//! provisioning observes and mutates organizations and users atomically, the
//! same guarantee the Postgres transaction gives.
//!
//! # Scoping
//! Admin operations filter on the organization in the caller's
//! [`SessionVariables`], mirroring the row-level security policy of the
//! durable backend.
use super::{IdentityStore, StoreError, StoreResult, scope_organization_id};
use crate::model::{
    NewUser, Organization, ProvisionOutcome, ProvisionRequest, ProvisionedIdentity, User,
    UserAccessPatch,
};
use async_trait::async_trait;
use atrium_authz::SessionVariables;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct IdentityTables {
    organizations: HashMap<Uuid, Organization>,
    users: HashMap<Uuid, User>,
}

impl IdentityTables {
    fn organization_by_name(&self, name: &str) -> Option<&Organization> {
        self.organizations.values().find(|org| org.name == name)
    }

    fn user_by_external_id(&self, external_subject_id: &str) -> Option<&User> {
        self.users
            .values()
            .find(|user| user.external_subject_id == external_subject_id)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<IdentityTables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an organization directly, bypassing provisioning.
    pub async fn insert_organization(&self, organization: Organization) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.organization_by_name(&organization.name).is_some() {
            return Err(StoreError::Conflict("organization".into()));
        }
        tables.organizations.insert(organization.id, organization);
        Ok(())
    }

    /// Seed a user directly, bypassing provisioning.
    pub async fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.user_by_external_id(&user.external_subject_id).is_some() {
            return Err(StoreError::Conflict("user".into()));
        }
        tables.users.insert(user.id, user);
        Ok(())
    }

    pub async fn organization_count(&self) -> usize {
        self.tables.read().await.organizations.len()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn provision_identity(&self, request: ProvisionRequest) -> StoreResult<ProvisionOutcome> {
        let mut tables = self.tables.write().await;

        let existing_org = tables
            .organization_by_name(&request.organization_name)
            .cloned();
        if let Some(org) = existing_org.as_ref().filter(|org| !org.is_active()) {
            return Ok(ProvisionOutcome::OrganizationInactive(org.clone()));
        }
        if let Some(user) = tables
            .user_by_external_id(&request.external_subject_id)
            .filter(|user| !user.is_active)
        {
            return Ok(ProvisionOutcome::UserInactive(user.clone()));
        }

        let organization = match existing_org {
            Some(existing) => existing,
            None => {
                let created = Organization::new(request.organization_name.clone());
                tables.organizations.insert(created.id, created.clone());
                created
            }
        };

        let existing_id = tables
            .user_by_external_id(&request.external_subject_id)
            .map(|user| user.id);
        let (user, user_created) = match existing_id.and_then(|id| tables.users.get_mut(&id)) {
            Some(user) => {
                user.organization_id = Some(organization.id);
                user.role = request.role;
                user.customer_type = Some(request.customer_type.as_str().to_string());
                if request.email.is_some() {
                    user.email = request.email.clone();
                }
                user.last_login_at = Some(request.login_at);
                (user.clone(), false)
            }
            None => {
                let user = User {
                    id: Uuid::new_v4(),
                    external_subject_id: request.external_subject_id.clone(),
                    email: request.email.clone(),
                    organization_id: Some(organization.id),
                    role: request.role,
                    customer_type: Some(request.customer_type.as_str().to_string()),
                    is_active: true,
                    last_login_at: Some(request.login_at),
                    created_at: request.login_at,
                };
                tables.users.insert(user.id, user.clone());
                (user, true)
            }
        };

        Ok(ProvisionOutcome::Provisioned(ProvisionedIdentity {
            organization,
            user,
            user_created,
        }))
    }

    async fn find_user_by_external_id(
        &self,
        external_subject_id: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .user_by_external_id(external_subject_id)
            .cloned())
    }

    async fn record_login(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        if let Some(email) = email {
            user.email = Some(email.to_string());
        }
        user.last_login_at = Some(at);
        Ok(user.clone())
    }

    async fn get_organization(&self, organization_id: Uuid) -> StoreResult<Organization> {
        self.tables
            .read()
            .await
            .organizations
            .get(&organization_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("organization".into()))
    }

    async fn create_user(&self, scope: &SessionVariables, new_user: NewUser) -> StoreResult<User> {
        let organization_id = scope_organization_id(scope)?;
        let mut tables = self.tables.write().await;
        if !tables.organizations.contains_key(&organization_id) {
            return Err(StoreError::NotFound("organization".into()));
        }
        if tables
            .user_by_external_id(&new_user.external_subject_id)
            .is_some()
        {
            return Err(StoreError::Conflict("user".into()));
        }
        let user = User {
            id: Uuid::new_v4(),
            external_subject_id: new_user.external_subject_id,
            email: new_user.email,
            organization_id: Some(organization_id),
            role: new_user.role,
            customer_type: Some(new_user.customer_type.as_str().to_string()),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user_access(
        &self,
        scope: &SessionVariables,
        user_id: Uuid,
        patch: UserAccessPatch,
    ) -> StoreResult<User> {
        let organization_id = scope_organization_id(scope)?;
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .filter(|user| user.organization_id == Some(organization_id))
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        patch.apply(user);
        Ok(user.clone())
    }

    async fn list_users(&self, scope: &SessionVariables) -> StoreResult<Vec<User>> {
        let organization_id = scope_organization_id(scope)?;
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|user| user.organization_id == Some(organization_id))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.external_subject_id.cmp(&b.external_subject_id));
        Ok(users)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
