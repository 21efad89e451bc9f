//! Search index layer
//!
//! A derived, possibly stale copy of the canonical store, shaped for
//! filtered, sorted and paginated lookups. One named index per entity type.
//!
//! ## Backends
//!
//! - [`SqliteIndex`]: SQLite + FTS5 database beside the relational store
//! - [`MeiliIndex`]: a Meilisearch server over HTTP

pub mod error;
pub mod meili;
pub mod schema;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::IndexDescriptor;
use crate::projection::SearchDocument;

pub use error::{IndexError, IndexResult};
pub use meili::MeiliIndex;
pub use sqlite::SqliteIndex;

/// Sort direction for a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(format!("Invalid sort order '{}', expected asc or desc", other)),
        }
    }
}

/// Paging and ordering for a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub limit: usize,
    pub offset: usize,
    /// Dotted document path; `None` keeps the backend's natural order
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            sort_field: None,
            sort_order: SortOrder::Asc,
        }
    }
}

/// One page of hits plus the size of the whole index
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchDocument>,
    /// Documents in the index, not matches on this page
    pub total_count: u64,
}

/// A store of named document indexes
///
/// Documents are addressed by the same primary key as their canonical row.
/// Implementations must be shareable across request threads.
pub trait SearchIndex: Send + Sync {
    /// Fail unless the backend is reachable and usable
    fn health(&self) -> IndexResult<()>;

    /// Create the index (and its settings) if missing; existing documents stay
    fn ensure_index(&self, descriptor: &IndexDescriptor) -> IndexResult<()>;

    /// Remove the index and every document in it; absent is fine
    fn drop_index(&self, name: &str) -> IndexResult<()>;

    /// Load many documents at once, keyed by `descriptor.primary_key`
    fn bulk_load(
        &self,
        descriptor: &IndexDescriptor,
        documents: Vec<SearchDocument>,
    ) -> IndexResult<usize>;

    /// Insert or fully replace a document
    fn add_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()>;

    /// Merge top-level fields into a document, inserting it if absent
    fn update_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()>;

    /// Remove a document by primary key; absent is fine
    fn delete_document(&self, name: &str, id: &str) -> IndexResult<()>;

    /// Ranked text search, or plain sort-and-page when `query` is empty
    fn search(&self, name: &str, query: &str, params: &SearchParams)
        -> IndexResult<SearchResults>;

    /// Number of documents, `None` if the index doesn't exist
    fn document_count(&self, name: &str) -> IndexResult<Option<u64>>;

    fn index_names(&self) -> IndexResult<Vec<String>>;
}

/// Lets a backend chosen at runtime stand in wherever an index is expected
impl<T: SearchIndex + ?Sized> SearchIndex for Box<T> {
    fn health(&self) -> IndexResult<()> {
        (**self).health()
    }

    fn ensure_index(&self, descriptor: &IndexDescriptor) -> IndexResult<()> {
        (**self).ensure_index(descriptor)
    }

    fn drop_index(&self, name: &str) -> IndexResult<()> {
        (**self).drop_index(name)
    }

    fn bulk_load(
        &self,
        descriptor: &IndexDescriptor,
        documents: Vec<SearchDocument>,
    ) -> IndexResult<usize> {
        (**self).bulk_load(descriptor, documents)
    }

    fn add_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()> {
        (**self).add_document(name, document)
    }

    fn update_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()> {
        (**self).update_document(name, document)
    }

    fn delete_document(&self, name: &str, id: &str) -> IndexResult<()> {
        (**self).delete_document(name, id)
    }

    fn search(
        &self,
        name: &str,
        query: &str,
        params: &SearchParams,
    ) -> IndexResult<SearchResults> {
        (**self).search(name, query, params)
    }

    fn document_count(&self, name: &str) -> IndexResult<Option<u64>> {
        (**self).document_count(name)
    }

    fn index_names(&self) -> IndexResult<Vec<String>> {
        (**self).index_names()
    }
}

/// Accept dotted paths made of `[A-Za-z0-9_]` segments only
pub fn validate_sort_field(field: &str) -> IndexResult<()> {
    let valid = !field.is_empty()
        && field.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidSort(field.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
        assert_eq!(SortOrder::Desc.to_string(), "desc");
    }

    #[test]
    fn test_validate_sort_field() {
        assert!(validate_sort_field("price").is_ok());
        assert!(validate_sort_field("relationships.name").is_ok());
        assert!(validate_sort_field("part_name").is_ok());

        assert!(validate_sort_field("").is_err());
        assert!(validate_sort_field("price desc").is_err());
        assert!(validate_sort_field("a..b").is_err());
        assert!(validate_sort_field(".price").is_err());
        assert!(validate_sort_field("price'); DROP TABLE x; --").is_err());
    }
}
