//! Storage error handling
//!
//! Provides typed errors for relational store operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;

use rusqlite::ffi;
use thiserror::Error;

use crate::models::RecordId;

/// Errors that can occur during relational store operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No row with this primary key
    #[error("No record with id {id} in '{table}'")]
    NotFound { table: &'static str, id: RecordId },

    /// Primary key or unique column already taken
    #[error("Conflict in '{table}': {detail}")]
    Conflict { table: &'static str, detail: String },

    /// Row references a missing record, or is still referenced by others
    #[error("Reference constraint failed in '{table}': {detail}")]
    Reference { table: &'static str, detail: String },

    /// Stored value could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StorageError {
    /// Classify a SQLite error raised while touching `table`
    ///
    /// Constraint violations become `Conflict` or `Reference`; everything
    /// else stays a plain database error.
    pub fn from_sqlite(error: rusqlite::Error, table: &'static str) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, ref message) = error {
            let detail = message
                .clone()
                .unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return StorageError::Conflict { table, detail };
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return StorageError::Reference { table, detail };
                }
                _ => {}
            }
        }
        StorageError::Database(error)
    }

    /// Check if this error was caused by the request rather than the store
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. }
                | StorageError::Conflict { .. }
                | StorageError::Reference { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Conflict { .. } => {
                Some("Use an update instead of a create, or pick a different unique value.")
            }
            StorageError::Reference { .. } => {
                Some("Check that referenced records exist, and remove records that still point at this one before deleting it.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
