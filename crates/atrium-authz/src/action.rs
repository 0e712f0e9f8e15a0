use crate::AuthzError;
use serde::{Deserialize, Serialize};

/// Operations gated by the permission matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Approve,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Approve,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
        }
    }

    pub(crate) const fn bit(self) -> u8 {
        match self {
            Action::Create => 1 << 0,
            Action::Read => 1 << 1,
            Action::Update => 1 << 2,
            Action::Delete => 1 << 3,
            Action::Approve => 1 << 4,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "approve" => Ok(Action::Approve),
            other => Err(AuthzError::InvalidAction(other.to_string())),
        }
    }
}

/// Kinds of objects managed through the admin platform.
///
/// The current matrix does not distinguish between kinds; the parameter is
/// kept on every check so per-kind rules can be added without touching callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Content,
    Service,
    Category,
    Organization,
    User,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Content => "content",
            ResourceKind::Service => "service",
            ResourceKind::Category => "category",
            ResourceKind::Organization => "organization",
            ResourceKind::User => "user",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "content" => Ok(ResourceKind::Content),
            "service" => Ok(ResourceKind::Service),
            "category" => Ok(ResourceKind::Category),
            "organization" => Ok(ResourceKind::Organization),
            "user" => Ok(ResourceKind::User),
            other => Err(AuthzError::InvalidResource(other.to_string())),
        }
    }
}
