//! Request-scoped authorization context and its storage projection.
use crate::{AuthzError, CanonicalRole};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer classification carried on every user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerClass {
    Staff,
    Partner,
    Enterprise,
}

impl CustomerClass {
    pub fn as_str(self) -> &'static str {
        match self {
            CustomerClass::Staff => "staff",
            CustomerClass::Partner => "partner",
            CustomerClass::Enterprise => "enterprise",
        }
    }

    /// Lenient parse: trims and ignores case. `None` for anything outside the
    /// three known classes.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "staff" => Some(CustomerClass::Staff),
            "partner" => Some(CustomerClass::Partner),
            "enterprise" => Some(CustomerClass::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for CustomerClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CustomerClass {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CustomerClass::parse(value)
            .ok_or_else(|| AuthzError::InvalidCustomerClass(value.to_string()))
    }
}

/// Who is calling, on behalf of which organization, with what role.
///
/// Rebuilt from the internal credential on every request; never cached
/// across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub customer_type: CustomerClass,
    pub role: CanonicalRole,
}

impl AuthorizationContext {
    pub fn session_variables(&self) -> SessionVariables {
        SessionVariables::from(self)
    }
}

/// Per-transaction settings consumed by row-level security policies.
///
/// Applied with `set_config(name, value, true)` so they vanish at commit or
/// rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVariables {
    pub current_user_id: String,
    pub current_organization_id: String,
    pub current_role: String,
    pub current_customer_type: String,
}

impl SessionVariables {
    pub const USER_ID: &'static str = "app.current_user_id";
    pub const ORGANIZATION_ID: &'static str = "app.current_organization_id";
    pub const ROLE: &'static str = "app.current_role";
    pub const CUSTOMER_TYPE: &'static str = "app.current_customer_type";

    /// Setting name / value pairs in a stable order.
    pub fn as_pairs(&self) -> [(&'static str, &str); 4] {
        [
            (Self::USER_ID, self.current_user_id.as_str()),
            (Self::ORGANIZATION_ID, self.current_organization_id.as_str()),
            (Self::ROLE, self.current_role.as_str()),
            (Self::CUSTOMER_TYPE, self.current_customer_type.as_str()),
        ]
    }
}

impl From<&AuthorizationContext> for SessionVariables {
    fn from(ctx: &AuthorizationContext) -> Self {
        Self {
            current_user_id: ctx.user_id.to_string(),
            current_organization_id: ctx.organization_id.to_string(),
            current_role: ctx.role.as_str().to_string(),
            current_customer_type: ctx.customer_type.as_str().to_string(),
        }
    }
}
