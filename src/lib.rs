//! docboot - bootstrap a document database for a service
//!
//! This crate provides:
//! - A fail-fast liveness check before the primary connection is registered
//! - Index reconciliation that rebuilds any collection whose live indexes
//!   drift from the declared ones
//! - Idempotent, race-tolerant seeding of the built-in authorization roles
//! - CLI commands wrapping each of the above

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod indexes;
pub mod roles;
pub mod schema;
pub mod store;

pub use bootstrap::{setup_database, Bootstrap, BootstrapOutcome, BootstrapReport};
pub use config::Config;
pub use error::{Error, Result};
