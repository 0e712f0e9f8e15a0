//! Atrium authorization core shared by the admin API and storage integrations.
//!
//! # Purpose
//! Turns inconsistently shaped identity-provider claims into a canonical
//! authorization context, decides tenant visibility, answers action-level
//! permission checks, and mints/verifies the internal session credential.
//!
//! # How it fits
//! The admin API validates the external bearer token, then feeds the raw
//! claims through [`normalize_claims`], [`OrganizationScopePolicy`] and
//! [`normalize_role`] before provisioning. Every later request is authorized
//! from the [`InternalTokenService`] credential alone.
//!
//! # Key invariants
//! - Everything in this crate is pure: no I/O, no shared mutable state.
//! - Only the four [`CanonicalRole`] values ever reach the permission matrix.
//! - Internal credentials are EdDSA/Ed25519 only.
//!
//! # Examples
//! ```rust
//! use atrium_authz::{Action, CanonicalRole, ResourceKind, can, normalize_role};
//!
//! let role = normalize_role("Contributor");
//! assert_eq!(role, CanonicalRole::Editor);
//! assert!(can(role, Action::Update, ResourceKind::Content));
//! assert!(!can(role, Action::Delete, ResourceKind::Content));
//! ```

mod action;
mod claims;
mod context;
mod errors;
mod permission;
mod role;
mod scope;
mod token;

pub use action::{Action, ResourceKind};
pub use claims::{NormalizedClaims, RawClaims, normalize_claims};
pub use context::{AuthorizationContext, CustomerClass, SessionVariables};
pub use errors::{AuthzError, AuthzResult, ClaimsError, TokenError};
pub use permission::{allowed_actions, can};
pub use role::{CanonicalRole, normalize_optional_role, normalize_role};
pub use scope::{DenyReason, OrganizationScopePolicy, ScopeDecision, Visibility};
pub use token::{
    DEFAULT_CREDENTIAL_TTL, InternalTokenService, IssuedCredential, Jwk, Jwks, SessionClaims,
    SigningKey, SigningKeys,
};
