//! Identity provider issuer configuration.
//!
//! # Purpose
//! Describes the single upstream IdP whose bearer tokens the login endpoint
//! accepts. Claim mapping is not configured here; the claim normalizer looks up
//! every known spelling instead.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct IdpIssuerConfig {
    pub issuer: String,
    /// Accepted `aud` values. Empty means the IdP client id is not pinned.
    #[serde(default)]
    pub audiences: Vec<String>,
    pub discovery_url: Option<String>,
    pub jwks_url: Option<String>,
}

impl IdpIssuerConfig {
    pub fn discovery_url(&self) -> String {
        self.discovery_url.clone().unwrap_or_else(|| {
            format!(
                "{}/.well-known/openid-configuration",
                self.issuer.trim_end_matches('/')
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_url_defaults_to_well_known() {
        let cfg = IdpIssuerConfig {
            issuer: "https://login.example/tenant/v2.0/".to_string(),
            audiences: Vec::new(),
            discovery_url: None,
            jwks_url: None,
        };
        assert_eq!(
            cfg.discovery_url(),
            "https://login.example/tenant/v2.0/.well-known/openid-configuration"
        );
    }

    #[test]
    fn explicit_discovery_url_wins() {
        let cfg = IdpIssuerConfig {
            issuer: "https://login.example".to_string(),
            audiences: vec!["admin-ui".to_string()],
            discovery_url: Some("https://login.example/custom".to_string()),
            jwks_url: None,
        };
        assert_eq!(cfg.discovery_url(), "https://login.example/custom");
    }
}
