//! Atrium admin API library crate.
//!
//! # Purpose
//! Exposes the HTTP surface, login orchestration, configuration and identity
//! stores for use by the binary and integration tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;
