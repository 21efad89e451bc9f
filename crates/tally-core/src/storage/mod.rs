//! Storage layer
//!
//! Handles the canonical relational store.
//!
//! ## Architecture
//!
//! - **SQLite**: Source of truth for every entity and for users
//! - **Search index** (see `index`): derived copy, rebuilt from here
//!
//! Nothing in this module touches the search index; keeping the two in
//! step is the ledger's job.

pub mod database;
pub mod error;
pub mod schema;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
