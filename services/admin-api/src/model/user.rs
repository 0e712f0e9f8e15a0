use super::Organization;
use atrium_authz::{CanonicalRole, CustomerClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Local user record. Role, organization binding and customer type stored
/// here are authoritative once a user exists.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub external_subject_id: String,
    pub email: Option<String>,
    pub organization_id: Option<Uuid>,
    #[schema(value_type = String, example = "editor")]
    pub role: CanonicalRole,
    pub customer_type: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Organization and customer type are both required to build a context.
    pub fn has_complete_profile(&self) -> bool {
        self.organization_id.is_some()
            && self
                .customer_type
                .as_deref()
                .is_some_and(|value| !value.trim().is_empty())
    }
}

/// Input for the sync provisioning flow: get-or-create the organization and
/// upsert the user in one transaction.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub external_subject_id: String,
    pub email: Option<String>,
    pub organization_name: String,
    pub customer_type: CustomerClass,
    pub role: CanonicalRole,
    pub login_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedIdentity {
    pub organization: Organization,
    pub user: User,
    pub user_created: bool,
}

/// Result of sync provisioning. Refusals are decided from the rows as they
/// stood before the login, and nothing is written for them.
#[derive(Debug, Clone)]
pub enum ProvisionOutcome {
    Provisioned(ProvisionedIdentity),
    OrganizationInactive(Organization),
    UserInactive(User),
}

/// Admin-created user; the organization comes from the caller's scope.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub external_subject_id: String,
    pub email: Option<String>,
    pub role: CanonicalRole,
    pub customer_type: CustomerClass,
}

#[derive(Debug, Clone, Default)]
pub struct UserAccessPatch {
    pub role: Option<CanonicalRole>,
    pub customer_type: Option<CustomerClass>,
    pub is_active: Option<bool>,
}

impl UserAccessPatch {
    pub fn apply(&self, user: &mut User) {
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(customer_type) = self.customer_type {
            user.customer_type = Some(customer_type.as_str().to_string());
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
    }
}
