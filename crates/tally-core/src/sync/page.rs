//! Paginated reads

use serde::{Deserialize, Serialize};

use crate::index::{validate_sort_field, SortOrder};
use crate::projection::SearchDocument;
use crate::sync::error::{SyncError, SyncResult};

/// Page size used when neither the request nor the config gives one
pub const DEFAULT_PAGE_LIMIT: usize = 5;

/// Largest page size accepted unless the config raises it
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Read parameters for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    /// 1-based page number
    pub page: usize,
    /// `None` falls back to the configured default
    pub page_limit: Option<usize>,
    pub query: String,
    pub order_by: String,
    pub sort_order: SortOrder,
    /// Return every document on a single page
    pub get_all: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_limit: None,
            query: String::new(),
            order_by: "id".to_string(),
            sort_order: SortOrder::Asc,
            get_all: false,
        }
    }
}

impl PageRequest {
    /// Check the request and return the page size to use
    pub fn validate(
        &self,
        default_limit: usize,
        max_limit: usize,
        sortable: &[&str],
    ) -> SyncResult<usize> {
        if self.page < 1 {
            return Err(SyncError::Validation("page must be at least 1".to_string()));
        }

        let limit = self.page_limit.unwrap_or(default_limit);
        if limit < 1 || limit > max_limit {
            return Err(SyncError::Validation(format!(
                "page_limit must be between 1 and {}, got {}",
                max_limit, limit
            )));
        }

        validate_sort_field(&self.order_by)
            .map_err(|_| SyncError::Validation(format!("invalid order_by '{}'", self.order_by)))?;
        if !sortable.contains(&self.order_by.as_str()) {
            return Err(SyncError::Validation(format!(
                "cannot order by '{}', expected one of: {}",
                self.order_by,
                sortable.join(", ")
            )));
        }

        Ok(limit)
    }

    /// Documents to skip before this page
    pub fn offset(&self, limit: usize) -> usize {
        self.page.saturating_sub(1).saturating_mul(limit)
    }
}

/// One page of search results, echoing the request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub page: usize,
    pub page_limit: usize,
    pub order_by: String,
    pub sort_order: SortOrder,
    pub query: String,
    /// Documents in the whole index
    pub total_count: u64,
    pub records: Vec<SearchDocument>,
    /// Documents on this page
    pub total_matched_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SORTABLE: &[&str] = &["id", "price", "relationships.name"];

    #[test]
    fn test_defaults() {
        let request = PageRequest::default();
        assert_eq!(request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE).unwrap(), 5);
        assert_eq!(request.offset(5), 0);
        assert_eq!(request.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_offset() {
        let request = PageRequest {
            page: 3,
            ..Default::default()
        };
        assert_eq!(request.offset(10), 20);
    }

    #[test]
    fn test_rejects_bad_pages() {
        let request = PageRequest {
            page: 0,
            ..Default::default()
        };
        assert!(matches!(
            request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE),
            Err(SyncError::Validation(_))
        ));

        let request = PageRequest {
            page_limit: Some(0),
            ..Default::default()
        };
        assert!(request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE).is_err());

        let request = PageRequest {
            page_limit: Some(1001),
            ..Default::default()
        };
        assert!(request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE).is_err());
    }

    #[test]
    fn test_rejects_bad_sort() {
        let request = PageRequest {
            order_by: "price desc".to_string(),
            ..Default::default()
        };
        assert!(request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE).is_err());

        let request = PageRequest {
            order_by: "vehicle_number".to_string(),
            ..Default::default()
        };
        let err = request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE).unwrap_err();
        assert!(err.to_string().contains("relationships.name"));

        let request = PageRequest {
            order_by: "relationships.name".to_string(),
            ..Default::default()
        };
        assert!(request.validate(DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, SORTABLE).is_ok());
    }

    #[test]
    fn test_request_from_json_uses_defaults() {
        let request: PageRequest =
            serde_json::from_value(json!({"page": 2, "sort_order": "desc"})).unwrap();
        assert_eq!(request.page, 2);
        assert_eq!(request.sort_order, SortOrder::Desc);
        assert_eq!(request.order_by, "id");
        assert!(!request.get_all);
    }

    #[test]
    fn test_page_keys() {
        let page = Page {
            page: 1,
            page_limit: 5,
            order_by: "id".to_string(),
            sort_order: SortOrder::Asc,
            query: String::new(),
            total_count: 0,
            records: Vec::new(),
            total_matched_count: 0,
        };

        let value = serde_json::to_value(&page).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "order_by",
                "page",
                "page_limit",
                "query",
                "records",
                "sort_order",
                "total_count",
                "total_matched_count"
            ]
        );
        assert_eq!(value["sort_order"], json!("asc"));
    }
}
