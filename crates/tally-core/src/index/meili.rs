//! Meilisearch search index
//!
//! Talks to a Meilisearch server over its HTTP API with a blocking client.
//! Every write is an asynchronous task on the server; each call here waits
//! for its task to finish so a successful return means the document is
//! searchable.

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::entity::IndexDescriptor;
use crate::index::error::{IndexError, IndexResult};
use crate::index::{validate_sort_field, SearchIndex, SearchParams, SearchResults};
use crate::projection::{SearchDocument, PRIMARY_KEY};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Search index hosted by a Meilisearch server
pub struct MeiliIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    task_timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRef {
    task_uid: u64,
}

#[derive(Debug, Deserialize)]
struct Task {
    status: String,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    number_of_documents: u64,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    results: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    uid: String,
}

impl MeiliIndex {
    /// Connect to a server, failing if it doesn't answer a health check
    pub fn connect(url: &str, api_key: Option<String>, task_timeout: Duration) -> IndexResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tally/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let index = Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key,
            task_timeout,
        };

        index.health().map_err(|e| IndexError::Unreachable {
            url: index.base_url.clone(),
            reason: e.to_string(),
        })?;

        info!(url = %index.base_url, "Connected to Meilisearch");
        Ok(index)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn get(&self, path: &str) -> IndexResult<Response> {
        Ok(self.authorize(self.client.get(self.url(path))).send()?)
    }

    /// Send a write request and wait for the task it enqueued
    fn submit(&self, request: RequestBuilder) -> IndexResult<(u64, Task)> {
        let response = check(self.authorize(request).send()?)?;
        let task: TaskRef = response.json()?;
        let finished = self.wait_for_task(task.task_uid)?;
        Ok((task.task_uid, finished))
    }

    fn wait_for_task(&self, uid: u64) -> IndexResult<Task> {
        let started = Instant::now();
        loop {
            let task: Task = check(self.get(&format!("tasks/{}", uid))?)?.json()?;
            match task.status.as_str() {
                "succeeded" | "failed" | "canceled" => {
                    debug!(uid, status = %task.status, "Task finished");
                    return Ok(task);
                }
                _ if started.elapsed() >= self.task_timeout => {
                    return Err(IndexError::TaskTimeout {
                        uid,
                        timeout_ms: self.task_timeout.as_millis() as u64,
                    });
                }
                _ => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    /// Submit and turn a failed task into an error, tolerating `ignore` codes
    fn run(&self, request: RequestBuilder, ignore: &[&str]) -> IndexResult<()> {
        let (uid, task) = self.submit(request)?;
        if task.status == "succeeded" {
            return Ok(());
        }

        let (message, code) = match task.error {
            Some(err) => (err.message, err.code),
            None => (format!("task {}", task.status), String::new()),
        };
        if ignore.contains(&code.as_str()) {
            return Ok(());
        }
        Err(classify(&code, message, |message| IndexError::Task { uid, message }))
    }

    fn create_index(&self, name: &str, primary_key: &str) -> IndexResult<()> {
        let request = self
            .client
            .post(self.url("indexes"))
            .json(&json!({ "uid": name, "primaryKey": primary_key }));
        self.run(request, &["index_already_exists"])
    }

    fn set_sortable(&self, descriptor: &IndexDescriptor) -> IndexResult<()> {
        let request = self
            .client
            .put(self.url(&format!("indexes/{}/settings/sortable-attributes", descriptor.name)))
            .json(&descriptor.sortable);
        self.run(request, &[])
    }

    fn push_documents(
        &self,
        name: &str,
        primary_key: &str,
        documents: &[&SearchDocument],
        replace: bool,
    ) -> IndexResult<()> {
        let url = self.url(&format!("indexes/{}/documents?primaryKey={}", name, primary_key));
        // POST replaces whole documents, PUT merges fields
        let request = if replace {
            self.client.post(url)
        } else {
            self.client.put(url)
        };
        self.run(request.json(documents), &[])
    }
}

/// Map a Meilisearch error code onto the matching error kind
fn classify(code: &str, message: String, otherwise: impl FnOnce(String) -> IndexError) -> IndexError {
    match code {
        "index_not_found" => IndexError::IndexNotFound(message),
        "invalid_search_sort" => IndexError::InvalidSort(message),
        "missing_document_id" | "invalid_document_id" => IndexError::MalformedDocument {
            index: String::new(),
            reason: message,
        },
        _ => otherwise(message),
    }
}

/// Turn a non-success HTTP status into an error, keeping the server's message
fn check(response: Response) -> IndexResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Option<ApiError> = response.json().ok();
    let (message, code) = match body {
        Some(err) => (err.message, err.code),
        None => (status.to_string(), String::new()),
    };

    if status == StatusCode::NOT_FOUND && code.is_empty() {
        return Err(IndexError::IndexNotFound(message));
    }
    Err(classify(&code, message, |message| IndexError::Rejected {
        status: status.as_u16(),
        message,
    }))
}

/// Meilisearch sort expression, e.g. `price:desc`
fn sort_expression(params: &SearchParams) -> IndexResult<Option<String>> {
    match params.sort_field {
        Some(ref field) => {
            validate_sort_field(field)?;
            Ok(Some(format!("{}:{}", field, params.sort_order)))
        }
        None => Ok(None),
    }
}

fn require_key(index: &str, document: &SearchDocument) -> IndexResult<()> {
    document
        .key(PRIMARY_KEY)
        .map(|_| ())
        .ok_or_else(|| IndexError::MalformedDocument {
            index: index.to_string(),
            reason: format!("missing integer or string '{}' field", PRIMARY_KEY),
        })
}

impl SearchIndex for MeiliIndex {
    fn health(&self) -> IndexResult<()> {
        check(self.get("health")?)?;
        Ok(())
    }

    fn ensure_index(&self, descriptor: &IndexDescriptor) -> IndexResult<()> {
        self.create_index(descriptor.name, descriptor.primary_key)?;
        self.set_sortable(descriptor)
    }

    fn drop_index(&self, name: &str) -> IndexResult<()> {
        let request = self.client.delete(self.url(&format!("indexes/{}", name)));
        match self.run(request, &["index_not_found"]) {
            Err(IndexError::IndexNotFound(_)) => Ok(()),
            other => other,
        }
    }

    fn bulk_load(
        &self,
        descriptor: &IndexDescriptor,
        documents: Vec<SearchDocument>,
    ) -> IndexResult<usize> {
        for document in &documents {
            require_key(descriptor.name, document)?;
        }

        self.ensure_index(descriptor)?;
        if !documents.is_empty() {
            let refs: Vec<&SearchDocument> = documents.iter().collect();
            self.push_documents(descriptor.name, descriptor.primary_key, &refs, true)?;
        }

        debug!(index = descriptor.name, count = documents.len(), "Bulk loaded documents");
        Ok(documents.len())
    }

    fn add_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()> {
        require_key(name, document)?;
        self.push_documents(name, PRIMARY_KEY, &[document], true)
    }

    fn update_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()> {
        require_key(name, document)?;
        self.push_documents(name, PRIMARY_KEY, &[document], false)
    }

    fn delete_document(&self, name: &str, id: &str) -> IndexResult<()> {
        let request = self
            .client
            .delete(self.url(&format!("indexes/{}/documents/{}", name, id)));
        match self.run(request, &["index_not_found"]) {
            Err(IndexError::IndexNotFound(_)) => Ok(()),
            other => other,
        }
    }

    fn search(
        &self,
        name: &str,
        query: &str,
        params: &SearchParams,
    ) -> IndexResult<SearchResults> {
        let mut body = json!({
            "q": query,
            "limit": params.limit,
            "offset": params.offset,
        });
        if let Some(sort) = sort_expression(params)? {
            body["sort"] = json!([sort]);
        }

        let request = self
            .client
            .post(self.url(&format!("indexes/{}/search", name)))
            .json(&body);
        let response: SearchResponse = check(self.authorize(request).send()?)?.json()?;

        let hits = response
            .hits
            .into_iter()
            .map(|hit| {
                SearchDocument::from_value(hit).ok_or_else(|| IndexError::MalformedDocument {
                    index: name.to_string(),
                    reason: "hit is not an object".to_string(),
                })
            })
            .collect::<IndexResult<Vec<_>>>()?;

        let total_count = self.document_count(name)?.unwrap_or_default();
        Ok(SearchResults { hits, total_count })
    }

    fn document_count(&self, name: &str) -> IndexResult<Option<u64>> {
        match check(self.get(&format!("indexes/{}/stats", name))?) {
            Ok(response) => {
                let stats: IndexStats = response.json()?;
                Ok(Some(stats.number_of_documents))
            }
            Err(IndexError::IndexNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn index_names(&self) -> IndexResult<Vec<String>> {
        let list: IndexList = check(self.get("indexes?limit=1000")?)?.json()?;
        let mut names: Vec<String> = list.results.into_iter().map(|entry| entry.uid).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SortOrder;

    #[test]
    fn test_sort_expression() {
        let params = SearchParams {
            sort_field: Some("relationships.name".to_string()),
            sort_order: SortOrder::Desc,
            ..Default::default()
        };
        assert_eq!(
            sort_expression(&params).unwrap(),
            Some("relationships.name:desc".to_string())
        );

        assert_eq!(sort_expression(&SearchParams::default()).unwrap(), None);

        let params = SearchParams {
            sort_field: Some("price:asc,id".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            sort_expression(&params).unwrap_err(),
            IndexError::InvalidSort(_)
        ));
    }

    #[test]
    fn test_error_codes() {
        let task = |message| IndexError::Task { uid: 3, message };

        let err = classify("index_not_found", "Index `eb_sales` not found.".to_string(), task);
        assert!(matches!(err, IndexError::IndexNotFound(_)));

        let err = classify("invalid_search_sort", "bad sort".to_string(), task);
        assert!(err.is_client_error());

        let err = classify("internal", "boom".to_string(), task);
        assert!(matches!(err, IndexError::Task { uid: 3, .. }));
    }

    #[test]
    fn test_require_key() {
        let doc = SearchDocument::from_value(json!({"id": 1})).unwrap();
        assert!(require_key("eb_sales", &doc).is_ok());

        let doc = SearchDocument::from_value(json!({"name": "x"})).unwrap();
        assert!(matches!(
            require_key("eb_sales", &doc).unwrap_err(),
            IndexError::MalformedDocument { .. }
        ));
    }

    #[test]
    fn test_connect_unreachable() {
        // Nothing listens on port 1
        let result = MeiliIndex::connect("http://127.0.0.1:1/", None, Duration::from_millis(100));
        match result {
            Err(IndexError::Unreachable { url, .. }) => assert_eq!(url, "http://127.0.0.1:1"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected connection failure"),
        }
    }
}
