//! Identity data model.
//!
//! # Purpose
//! Organizations and users as persisted by the identity stores and returned
//! by the admin endpoints.
mod organization;
mod user;

pub use organization::{Organization, OrganizationStatus};
pub use user::{
    NewUser, ProvisionOutcome, ProvisionRequest, ProvisionedIdentity, User, UserAccessPatch,
};
