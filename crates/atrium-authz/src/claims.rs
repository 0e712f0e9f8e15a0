//! Identity-provider claim normalization.
//!
//! # Purpose
//! Different IdP tenants emit the same logical attribute under many keys:
//! `customerType`, `extension_CustomerType`, `"Customer Type"`,
//! `extension_<appId>_customerType`, and so on. This module reduces a raw
//! claims bag to a single [`NormalizedClaims`] record.
//!
//! # How it fits
//! Runs right after the external bearer token has been validated and before
//! the organization scope policy. Nothing here touches storage.
//!
//! # Key invariants
//! - Probing is a fixed table of aliases per field, expanded into spellings in
//!   a deterministic order; the first non-empty value wins.
//! - Provider-extension spellings outrank generic spellings, so a tenant can
//!   shadow a generic claim with its own custom attribute.
//! - The subject falls back `sub -> oid -> objectId` and never reads extension
//!   attributes.
//! - A field without a matching key is `None`. Values are never inferred from
//!   other fields.
//!
//! # Examples
//! ```rust
//! use atrium_authz::{RawClaims, normalize_claims};
//! use serde_json::json;
//!
//! let raw: RawClaims = serde_json::from_value(json!({
//!     "sub": "user-1",
//!     "customerType": "Staff",
//!     "userRole": "Admin",
//!     "Company Name": " InternalOrgA ",
//! }))
//! .unwrap();
//! let claims = normalize_claims(&raw).unwrap();
//! assert_eq!(claims.customer_type.as_deref(), Some("staff"));
//! assert_eq!(claims.user_role.as_deref(), Some("admin"));
//! assert_eq!(claims.organization_name.as_deref(), Some("InternalOrgA"));
//! ```
use crate::ClaimsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Untyped claims bag as decoded from the IdP token payload.
pub type RawClaims = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedClaims {
    pub external_subject_id: String,
    pub email: Option<String>,
    /// Trimmed and lowercased.
    pub customer_type: Option<String>,
    /// Trimmed and lowercased; not yet collapsed to a canonical role.
    pub user_role: Option<String>,
    /// Trimmed only. Compared against stored organization names.
    pub organization_name: Option<String>,
}

#[derive(Clone, Copy)]
enum Casing {
    Preserve,
    Lowercase,
}

struct FieldSpec {
    aliases: &'static [&'static [&'static str]],
    extensions: bool,
    casing: Casing,
}

const SUBJECT: FieldSpec = FieldSpec {
    aliases: &[&["sub"], &["oid"], &["object", "id"]],
    extensions: false,
    casing: Casing::Preserve,
};

const EMAIL: FieldSpec = FieldSpec {
    aliases: &[&["email"], &["emails"], &["email", "address"], &["mail"]],
    extensions: true,
    casing: Casing::Preserve,
};

const CUSTOMER_TYPE: FieldSpec = FieldSpec {
    aliases: &[&["customer", "type"], &["customer", "class"]],
    extensions: true,
    casing: Casing::Lowercase,
};

const USER_ROLE: FieldSpec = FieldSpec {
    aliases: &[&["user", "role"], &["role"], &["roles"]],
    extensions: true,
    casing: Casing::Lowercase,
};

const ORGANIZATION: FieldSpec = FieldSpec {
    aliases: &[
        &["company", "name"],
        &["organization", "name"],
        &["organization"],
        &["company"],
    ],
    extensions: true,
    casing: Casing::Preserve,
};

const EXTENSION_PREFIX: &str = "extension_";

pub fn normalize_claims(raw: &RawClaims) -> Result<NormalizedClaims, ClaimsError> {
    let external_subject_id =
        lookup(raw, &SUBJECT).ok_or(ClaimsError::MissingRequiredClaim("sub"))?;
    Ok(NormalizedClaims {
        external_subject_id,
        email: lookup(raw, &EMAIL),
        customer_type: lookup(raw, &CUSTOMER_TYPE),
        user_role: lookup(raw, &USER_ROLE),
        organization_name: lookup(raw, &ORGANIZATION),
    })
}

fn lookup(raw: &RawClaims, field: &FieldSpec) -> Option<String> {
    let found = if field.extensions {
        field
            .aliases
            .iter()
            .find_map(|words| lookup_extensions(raw, words))
    } else {
        None
    };
    let found = found.or_else(|| {
        field.aliases.iter().find_map(|words| {
            generic_spellings(words)
                .iter()
                .find_map(|key| raw.get(key).and_then(claim_text))
        })
    })?;
    Some(match field.casing {
        Casing::Preserve => found,
        Casing::Lowercase => found.to_lowercase(),
    })
}

fn lookup_extensions(raw: &RawClaims, words: &[&str]) -> Option<String> {
    let forms = extension_forms(words);
    for form in &forms {
        let key = format!("{EXTENSION_PREFIX}{form}");
        if let Some(value) = raw.get(&key).and_then(claim_text) {
            return Some(value);
        }
    }
    // App-scoped custom attributes: extension_<appId>_<form>.
    for form in &forms {
        let mut scoped: Vec<(&String, &Value)> = raw
            .iter()
            .filter(|(key, _)| is_app_scoped_extension(key, form))
            .collect();
        scoped.sort_by(|a, b| a.0.cmp(b.0));
        if let Some(value) = scoped.into_iter().find_map(|(_, value)| claim_text(value)) {
            return Some(value);
        }
    }
    None
}

fn is_app_scoped_extension(key: &str, form: &str) -> bool {
    let Some(rest) = key.strip_prefix(EXTENSION_PREFIX) else {
        return false;
    };
    let Some(app) = rest.strip_suffix(form) else {
        return false;
    };
    let Some(app) = app.strip_suffix('_') else {
        return false;
    };
    !app.is_empty() && app.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Generic spellings in priority order: exact (camelCase), human label,
/// PascalCase, lowercase, uppercase, snake_case.
fn generic_spellings(words: &[&str]) -> Vec<String> {
    let camel = camel_case(words);
    let candidates = [
        camel.clone(),
        label_case(words),
        pascal_case(words),
        camel,
        words.concat().to_lowercase(),
        words.concat().to_uppercase(),
        words.join("_").to_lowercase(),
    ];
    dedup(candidates)
}

fn extension_forms(words: &[&str]) -> Vec<String> {
    dedup([
        camel_case(words),
        pascal_case(words),
        words.concat().to_lowercase(),
        words.join("_").to_lowercase(),
    ])
}

fn dedup<const N: usize>(candidates: [String; N]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(N);
    for candidate in candidates {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn camel_case(words: &[&str]) -> String {
    let mut out = String::new();
    for (idx, word) in words.iter().enumerate() {
        if idx == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

fn pascal_case(words: &[&str]) -> String {
    words.iter().map(|word| capitalize(word)).collect()
}

fn label_case(words: &[&str]) -> String {
    words
        .iter()
        .map(|word| capitalize(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strings are trimmed; arrays contribute their first non-empty string.
/// Any other JSON type is not a usable claim value.
fn claim_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::String(_) => claim_text(item),
            _ => None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawClaims {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn with_subject(key: &str, value: Value) -> RawClaims {
        let mut claims = raw(json!({ "sub": "user-1" }));
        claims.insert(key.to_string(), value);
        claims
    }

    #[test]
    fn every_customer_type_spelling_is_recognized() {
        for key in [
            "customerType",
            "Customer Type",
            "CustomerType",
            "customertype",
            "CUSTOMERTYPE",
            "customer_type",
            "extension_customerType",
            "extension_CustomerType",
            "extension_customertype",
            "extension_customer_type",
            "extension_9f3c2ab0d1e04b7a_customerType",
            "customerClass",
            "extension_CustomerClass",
        ] {
            let claims = normalize_claims(&with_subject(key, json!(" Partner "))).expect(key);
            assert_eq!(claims.customer_type.as_deref(), Some("partner"), "key {key}");
        }
    }

    #[test]
    fn every_user_role_spelling_is_recognized() {
        for key in [
            "userRole",
            "User Role",
            "UserRole",
            "userrole",
            "USERROLE",
            "user_role",
            "extension_userRole",
            "extension_UserRole",
            "extension_userrole",
            "extension_user_role",
            "extension_b2c01_UserRole",
            "role",
            "Role",
            "ROLE",
            "roles",
        ] {
            let claims = normalize_claims(&with_subject(key, json!("Approver"))).expect(key);
            assert_eq!(claims.user_role.as_deref(), Some("approver"), "key {key}");
        }
    }

    #[test]
    fn every_organization_spelling_is_recognized() {
        for key in [
            "companyName",
            "Company Name",
            "CompanyName",
            "companyname",
            "COMPANYNAME",
            "company_name",
            "extension_companyName",
            "extension_CompanyName",
            "extension_companyname",
            "extension_company_name",
            "extension_abc123_CompanyName",
            "organizationName",
            "Organization Name",
            "organization",
            "Organization",
            "company",
        ] {
            let claims = normalize_claims(&with_subject(key, json!("  Acme Corp "))).expect(key);
            assert_eq!(
                claims.organization_name.as_deref(),
                Some("Acme Corp"),
                "key {key}"
            );
        }
    }

    #[test]
    fn every_email_spelling_is_recognized() {
        for key in [
            "email",
            "Email",
            "EMAIL",
            "extension_email",
            "extension_Email",
            "emails",
            "Emails",
            "emailAddress",
            "Email Address",
            "email_address",
            "mail",
        ] {
            let claims =
                normalize_claims(&with_subject(key, json!("Jane.Doe@Example.com"))).expect(key);
            assert_eq!(
                claims.email.as_deref(),
                Some("Jane.Doe@Example.com"),
                "key {key}"
            );
        }
    }

    #[test]
    fn every_subject_spelling_is_recognized() {
        for key in [
            "sub", "Sub", "SUB", "oid", "OID", "Oid", "objectId", "ObjectId", "objectid",
            "OBJECTID", "object_id", "Object Id",
        ] {
            let claims = normalize_claims(&raw(json!({ key: "abc-123" }))).expect(key);
            assert_eq!(claims.external_subject_id, "abc-123", "key {key}");
        }
    }

    #[test]
    fn subject_prefers_sub_then_oid_then_object_id() {
        let all = raw(json!({ "sub": "s", "oid": "o", "objectId": "x" }));
        assert_eq!(normalize_claims(&all).unwrap().external_subject_id, "s");
        let no_sub = raw(json!({ "oid": "o", "objectId": "x" }));
        assert_eq!(normalize_claims(&no_sub).unwrap().external_subject_id, "o");
        let empty_sub = raw(json!({ "sub": "  ", "objectId": "x" }));
        assert_eq!(normalize_claims(&empty_sub).unwrap().external_subject_id, "x");
    }

    #[test]
    fn subject_ignores_extension_attributes() {
        let claims = raw(json!({ "extension_sub": "shadow", "extension_oid": "shadow" }));
        assert_eq!(
            normalize_claims(&claims),
            Err(ClaimsError::MissingRequiredClaim("sub"))
        );
    }

    #[test]
    fn missing_subject_fails() {
        let claims = raw(json!({ "email": "a@example.com", "customerType": "staff" }));
        assert_eq!(
            normalize_claims(&claims),
            Err(ClaimsError::MissingRequiredClaim("sub"))
        );
    }

    #[test]
    fn extension_keys_outrank_generic_keys() {
        let claims = raw(json!({
            "sub": "u",
            "customerType": "partner",
            "extension_CustomerType": "staff",
            "userRole": "viewer",
            "extension_9f3c_userRole": "admin",
            "companyName": "Generic Org",
            "extension_companyName": "Tenant Org",
        }));
        let normalized = normalize_claims(&claims).unwrap();
        assert_eq!(normalized.customer_type.as_deref(), Some("staff"));
        assert_eq!(normalized.user_role.as_deref(), Some("admin"));
        assert_eq!(normalized.organization_name.as_deref(), Some("Tenant Org"));
    }

    #[test]
    fn generic_priority_is_deterministic() {
        let claims = raw(json!({
            "sub": "u",
            "customerType": "staff",
            "Customer Type": "partner",
            "CUSTOMERTYPE": "enterprise",
        }));
        assert_eq!(
            normalize_claims(&claims).unwrap().customer_type.as_deref(),
            Some("staff")
        );
        let claims = raw(json!({
            "sub": "u",
            "Customer Type": "partner",
            "CUSTOMERTYPE": "enterprise",
        }));
        assert_eq!(
            normalize_claims(&claims).unwrap().customer_type.as_deref(),
            Some("partner")
        );
    }

    #[test]
    fn empty_values_fall_through_to_next_spelling() {
        let claims = raw(json!({
            "sub": "u",
            "extension_companyName": "   ",
            "Company Name": "Fallback Org",
        }));
        assert_eq!(
            normalize_claims(&claims).unwrap().organization_name.as_deref(),
            Some("Fallback Org")
        );
    }

    #[test]
    fn arrays_contribute_first_non_empty_string() {
        let claims = raw(json!({
            "sub": "u",
            "emails": ["", "first@example.com", "second@example.com"],
            "roles": [42, "Editor"],
        }));
        let normalized = normalize_claims(&claims).unwrap();
        assert_eq!(normalized.email.as_deref(), Some("first@example.com"));
        assert_eq!(normalized.user_role.as_deref(), Some("editor"));
    }

    #[test]
    fn non_string_values_are_ignored() {
        let claims = raw(json!({ "sub": "u", "customerType": 7, "userRole": true }));
        let normalized = normalize_claims(&claims).unwrap();
        assert_eq!(normalized.customer_type, None);
        assert_eq!(normalized.user_role, None);
    }

    #[test]
    fn missing_fields_are_not_inferred() {
        let claims = raw(json!({
            "sub": "u",
            "email": "admin@internalorga.example",
            "name": "Staff Admin",
        }));
        let normalized = normalize_claims(&claims).unwrap();
        assert_eq!(normalized.customer_type, None);
        assert_eq!(normalized.user_role, None);
        assert_eq!(normalized.organization_name, None);
    }

    #[test]
    fn organization_name_keeps_case() {
        let claims = raw(json!({ "sub": "u", "Company Name": "InternalOrgA" }));
        assert_eq!(
            normalize_claims(&claims).unwrap().organization_name.as_deref(),
            Some("InternalOrgA")
        );
    }

    #[test]
    fn staff_scenario_normalizes_all_fields() {
        let claims = raw(json!({
            "sub": "ext-42",
            "customerType": "Staff",
            "userRole": "Admin",
            "Company Name": "InternalOrgA",
        }));
        assert_eq!(
            normalize_claims(&claims).unwrap(),
            NormalizedClaims {
                external_subject_id: "ext-42".to_string(),
                email: None,
                customer_type: Some("staff".to_string()),
                user_role: Some("admin".to_string()),
                organization_name: Some("InternalOrgA".to_string()),
            }
        );
    }

    #[test]
    fn app_scoped_extension_requires_alphanumeric_app_id() {
        assert!(is_app_scoped_extension(
            "extension_9f3c2ab0_customerType",
            "customerType"
        ));
        assert!(!is_app_scoped_extension("extension_customerType", "customerType"));
        assert!(!is_app_scoped_extension(
            "extension_a_b_customerType",
            "customerType"
        ));
        assert!(!is_app_scoped_extension("xextension_1_customerType", "customerType"));
    }

    #[test]
    fn spellings_are_generated_in_priority_order() {
        assert_eq!(
            generic_spellings(&["company", "name"]),
            vec![
                "companyName",
                "Company Name",
                "CompanyName",
                "companyname",
                "COMPANYNAME",
                "company_name"
            ]
        );
        assert_eq!(generic_spellings(&["oid"]), vec!["oid", "Oid", "OID"]);
    }
}
