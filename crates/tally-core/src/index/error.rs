//! Search index errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a search index backend
#[derive(Error, Debug)]
pub enum IndexError {
    /// Index has never been created, or was dropped
    #[error("Index '{0}' does not exist")]
    IndexNotFound(String),

    /// Document is not an object or lacks a usable primary key
    #[error("Malformed document for index '{index}': {reason}")]
    MalformedDocument { index: String, reason: String },

    /// Sort field is not a plain dotted path
    #[error("Invalid sort field '{0}'")]
    InvalidSort(String),

    /// Failed to create the directory for a local index
    #[error("Failed to create index directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Local index database error
    #[error("Index database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Request to the search server failed
    #[error("Search server request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Search server could not be reached at startup
    #[error("Search server at '{url}' is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    /// Search server refused a request outright
    #[error("Search server rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Search server rejected an enqueued task
    #[error("Search server task {uid} failed: {message}")]
    Task { uid: u64, message: String },

    /// Search server didn't finish a task in time
    #[error("Search server task {uid} did not finish within {timeout_ms} ms")]
    TaskTimeout { uid: u64, timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IndexError {
    /// Check if this error was caused by the request rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidSort(_) | IndexError::MalformedDocument { .. }
        )
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
