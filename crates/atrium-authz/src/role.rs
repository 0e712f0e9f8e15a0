//! Canonical role vocabulary and legacy role collapsing.
//!
//! # Purpose
//! Historical deployments used `creator` and `contributor` for what is now the
//! `editor` role, and IdP tenants spell roles with arbitrary casing. This
//! module collapses all of them into exactly four canonical roles.
//!
//! # Key invariants
//! - [`normalize_role`] is total: it never fails.
//! - Unknown input maps to [`CanonicalRole::Viewer`], never to anything wider.
//! - Normalization is idempotent.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalRole {
    Admin,
    Approver,
    Editor,
    Viewer,
}

impl CanonicalRole {
    pub const ALL: [CanonicalRole; 4] = [
        CanonicalRole::Admin,
        CanonicalRole::Approver,
        CanonicalRole::Editor,
        CanonicalRole::Viewer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalRole::Admin => "admin",
            CanonicalRole::Approver => "approver",
            CanonicalRole::Editor => "editor",
            CanonicalRole::Viewer => "viewer",
        }
    }

    /// Strict parse of an already canonical role name.
    ///
    /// Used when reading roles back from storage or from a credential, where a
    /// non-canonical value means corruption rather than a legacy spelling.
    pub fn from_canonical(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(CanonicalRole::Admin),
            "approver" => Some(CanonicalRole::Approver),
            "editor" => Some(CanonicalRole::Editor),
            "viewer" => Some(CanonicalRole::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for CanonicalRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapse any role spelling into a [`CanonicalRole`].
///
/// # Example
/// ```rust
/// use atrium_authz::{CanonicalRole, normalize_role};
///
/// assert_eq!(normalize_role(" Creator "), CanonicalRole::Editor);
/// assert_eq!(normalize_role("superuser"), CanonicalRole::Viewer);
/// ```
pub fn normalize_role(raw: &str) -> CanonicalRole {
    match raw.trim().to_ascii_lowercase().as_str() {
        "admin" => CanonicalRole::Admin,
        "approver" => CanonicalRole::Approver,
        "creator" | "contributor" | "editor" => CanonicalRole::Editor,
        "viewer" => CanonicalRole::Viewer,
        _ => CanonicalRole::Viewer,
    }
}

/// Same as [`normalize_role`], treating a missing claim as unknown.
pub fn normalize_optional_role(raw: Option<&str>) -> CanonicalRole {
    raw.map(normalize_role).unwrap_or(CanonicalRole::Viewer)
}
