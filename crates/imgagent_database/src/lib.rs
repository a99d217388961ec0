//! PostgreSQL document store for the imgagent pipeline.
//!
//! Documents, chapters, roles, and scenes live in four tables. Every call
//! borrows a pooled connection on a blocking thread; stage commits run in a
//! single transaction with the document row locked.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conversions;
#[allow(missing_docs)]
mod models;
#[allow(missing_docs)]
pub mod schema;
mod store;

pub use config::DatabaseConfig;
pub use conversions::parse_status;
pub use models::{ChapterRow, DocumentRow, RoleRow, SceneRow};
pub use store::{PgPool, PostgresDocumentStore, run_migrations};
