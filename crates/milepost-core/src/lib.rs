//! milepost-core library.
//!
//! The project aggregate (members, validation, function reassignment), the
//! shared function registry, milestone classification, ticket numbering and
//! tag counts, and the audit trail, persisted in SQLite.
//!
//! # Conventions
//!
//! - **Errors**: store and aggregate operations return [`error::Result`]
//!   with a typed [`error::ProjectError`]; opening the store and loading
//!   config use `anyhow::Result`.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`). The core
//!   never installs a subscriber.
//! - **Time**: timestamps are `i64` microseconds since the Unix epoch.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod model;

pub use access::AccessFacts;
pub use db::Store;
pub use error::{ErrorCode, ProjectError};
