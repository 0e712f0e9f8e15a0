//! Admin API HTTP handlers.
//!
//! # Purpose
//! Route handler modules plus the shared error and payload types.
pub mod error;
pub mod openapi;
pub mod system;
pub mod types;
pub mod users;
