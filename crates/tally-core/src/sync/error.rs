//! Synchronization errors
//!
//! The error kinds a caller of the ledger has to tell apart. Relational
//! failures always abort before the index is touched; a `Divergence`
//! means the relational write committed and only the index is behind.

use thiserror::Error;

use crate::index::IndexError;
use crate::models::RecordId;
use crate::storage::StorageError;
use crate::sync::state::Operation;

/// Errors surfaced by [`Ledger`](super::Ledger) operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed request parameters
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown primary key
    #[error("No record with id {id} in '{table}'")]
    NotFound { table: &'static str, id: RecordId },

    /// Primary key or unique value already taken
    #[error("Conflict in '{table}': {detail}")]
    Conflict { table: &'static str, detail: String },

    /// Relational store failure; nothing reached the index
    #[error("Relational store error: {0}")]
    Relational(#[source] StorageError),

    /// Index failure on a read or rebuild path
    #[error("Search index error: {0}")]
    Index(#[from] IndexError),

    /// Relational write committed but the index push failed
    #[error(
        "{operation} of record {id} in '{index}' succeeded, but the search index was not updated: {source}"
    )]
    Divergence {
        operation: Operation,
        index: &'static str,
        id: RecordId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { table, id } => SyncError::NotFound { table, id },
            StorageError::Conflict { table, detail } => SyncError::Conflict { table, detail },
            other => SyncError::Relational(other),
        }
    }
}

impl SyncError {
    /// Check if the stores may now disagree about a record
    pub fn is_divergence(&self) -> bool {
        matches!(self, SyncError::Divergence { .. })
    }

    /// HTTP-style status code for this error kind
    pub fn status_code(&self) -> u16 {
        match self {
            SyncError::Validation(_) => 400,
            SyncError::NotFound { .. } => 404,
            SyncError::Conflict { .. } => 409,
            SyncError::Relational(e) if e.is_client_error() => 409,
            SyncError::Relational(_) => 500,
            SyncError::Index(e) if e.is_client_error() => 400,
            SyncError::Index(_) | SyncError::Divergence { .. } => 502,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Divergence { .. } => Some(
                "The record was saved, but search results are stale. Run `tally rebuild` to repair the search index.",
            ),
            SyncError::Conflict { .. } => {
                Some("Use an update instead of a create, or pick a different unique value.")
            }
            SyncError::Relational(e) => e.recovery_suggestion(),
            SyncError::Index(IndexError::Unreachable { .. })
            | SyncError::Index(IndexError::Http(_)) => {
                Some("Check that the search server is running and index.url is correct.")
            }
            SyncError::Index(IndexError::IndexNotFound(_)) => {
                Some("Run `tally rebuild` to create the search indexes.")
            }
            _ => None,
        }
    }
}

/// Result type for ledger operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_lifted() {
        let err: SyncError = StorageError::NotFound {
            table: "eb_sales",
            id: 3,
        }
        .into();
        assert!(matches!(err, SyncError::NotFound { id: 3, .. }));
        assert_eq!(err.status_code(), 404);

        let err: SyncError = StorageError::Conflict {
            table: "eb_users",
            detail: "email".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), 409);

        let err: SyncError = StorageError::Serialization("bad".to_string()).into();
        assert!(matches!(err, SyncError::Relational(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_divergence() {
        let err = SyncError::Divergence {
            operation: Operation::Create,
            index: "eb_sales",
            id: 7,
            source: Box::new(IndexError::IndexNotFound("eb_sales".to_string())),
        };

        assert!(err.is_divergence());
        assert_eq!(err.status_code(), 502);
        let msg = err.to_string();
        assert!(msg.contains("create of record 7"));
        assert!(msg.contains("not updated"));
        assert!(err.recovery_suggestion().unwrap().contains("tally rebuild"));
    }

    #[test]
    fn test_validation_is_client_error() {
        let err = SyncError::Validation("page must be at least 1".to_string());
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_divergence());
    }
}
