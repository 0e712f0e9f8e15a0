//! Authentication and authorization modules.
//!
//! # Purpose
//! Groups upstream IdP validation, the login state machine, credential
//! signing keys, JWKS publication and the per-request extractor.
pub mod idp_registry;
pub mod jwks;
pub mod keys;
pub mod login;
pub mod oidc;
pub mod orchestrator;
pub mod session;
