//! Organization (tenant) scope policy.
//!
//! # Purpose
//! Decides, from normalized claims alone, whether a caller may enter the
//! platform at all and which organizations their data view covers.
//!
//! # Key invariants
//! - Evaluation is pure and runs before any identity row is touched, so a
//!   denial never leaves side effects behind.
//! - Rules are checked in order and the first match wins.
//! - Missing or unknown customer types are denied.
use serde::{Deserialize, Serialize};

/// Why a caller was refused at the policy step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    EnterpriseBlocked,
    StaffOrgNotAllowed,
    PartnerMissingOrg,
    UnrecognizedCustomerType,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::EnterpriseBlocked => "enterprise_blocked",
            DenyReason::StaffOrgNotAllowed => "staff_org_not_allowed",
            DenyReason::PartnerMissingOrg => "partner_missing_org",
            DenyReason::UnrecognizedCustomerType => "unrecognized_customer_type",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DenyReason::EnterpriseBlocked => "enterprise accounts cannot access the admin platform",
            DenyReason::StaffOrgNotAllowed => "organization is not on the staff allow-list",
            DenyReason::PartnerMissingOrg => "partner account has no organization",
            DenyReason::UnrecognizedCustomerType => "customer type is missing or not recognized",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data view granted on allow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "organizations", rename_all = "snake_case")]
pub enum Visibility {
    /// Staff see every organization on the allow-list.
    AllowListed(Vec<String>),
    /// Partners see only their own organization.
    OwnOrganization(String),
}

impl Visibility {
    pub fn organizations(&self) -> Vec<String> {
        match self {
            Visibility::AllowListed(names) => names.clone(),
            Visibility::OwnOrganization(name) => vec![name.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeDecision {
    Allow { visibility: Visibility },
    Deny(DenyReason),
}

impl ScopeDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ScopeDecision::Allow { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationScopePolicy {
    staff_organizations: Vec<String>,
}

impl OrganizationScopePolicy {
    /// Build a policy from the staff allow-list. Entries are trimmed and
    /// blanks dropped.
    pub fn new<I, S>(staff_organizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for name in staff_organizations {
            let name = name.as_ref().trim();
            if !name.is_empty() && !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        Self {
            staff_organizations: names,
        }
    }

    pub fn staff_organizations(&self) -> &[String] {
        &self.staff_organizations
    }

    pub fn evaluate(
        &self,
        customer_type: Option<&str>,
        organization_name: Option<&str>,
    ) -> ScopeDecision {
        let organization = organization_name
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let customer_type = customer_type.map(|value| value.trim().to_ascii_lowercase());

        match customer_type.as_deref() {
            Some("enterprise") => ScopeDecision::Deny(DenyReason::EnterpriseBlocked),
            Some("staff") => match organization {
                Some(name) if self.staff_organizations.iter().any(|allowed| allowed == name) => {
                    ScopeDecision::Allow {
                        visibility: Visibility::AllowListed(self.staff_organizations.clone()),
                    }
                }
                _ => ScopeDecision::Deny(DenyReason::StaffOrgNotAllowed),
            },
            Some("partner") => match organization {
                Some(name) => ScopeDecision::Allow {
                    visibility: Visibility::OwnOrganization(name.to_string()),
                },
                None => ScopeDecision::Deny(DenyReason::PartnerMissingOrg),
            },
            _ => ScopeDecision::Deny(DenyReason::UnrecognizedCustomerType),
        }
    }
}
