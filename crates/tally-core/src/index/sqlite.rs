//! SQLite search index
//!
//! Local implementation of [`SearchIndex`]. Documents live as JSON in a
//! separate database file from the canonical store, so the two can diverge
//! and be repaired exactly like a remote search server.
//!
//! Text matching uses FTS5 over every string and number in a document;
//! each query term is prefix-matched and all terms must hit. Sorting uses
//! `json_extract` on the requested path.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::entity::IndexDescriptor;
use crate::index::error::{IndexError, IndexResult};
use crate::index::schema::{init_schema, needs_init};
use crate::index::{validate_sort_field, SearchIndex, SearchParams, SearchResults, SortOrder};
use crate::projection::{SearchDocument, PRIMARY_KEY};

/// Search index stored in a local SQLite database
#[derive(Clone)]
pub struct SqliteIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteIndex {
    /// Open or create the index database described by the configuration
    pub fn open(config: &Config) -> IndexResult<Self> {
        Self::open_path(&config.index_path())
    }

    pub fn open_path(path: &Path) -> IndexResult<Self> {
        info!(path = ?path, "Opening search index");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory index (for testing)
    pub fn open_in_memory() -> IndexResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> IndexResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl SearchIndex for SqliteIndex {
    fn health(&self) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn ensure_index(&self, descriptor: &IndexDescriptor) -> IndexResult<()> {
        let conn = self.conn.lock();
        create_index(&conn, descriptor.name, descriptor.primary_key)?;
        Ok(())
    }

    fn drop_index(&self, name: &str) -> IndexResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM documents WHERE index_name = ?1", params![name])?;
        tx.execute("DELETE FROM search_indexes WHERE name = ?1", params![name])?;
        tx.commit()?;

        debug!(index = name, removed, "Dropped index");
        Ok(())
    }

    fn bulk_load(
        &self,
        descriptor: &IndexDescriptor,
        documents: Vec<SearchDocument>,
    ) -> IndexResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        create_index(&tx, descriptor.name, descriptor.primary_key)?;

        for document in &documents {
            let key = document_key(descriptor.name, descriptor.primary_key, document)?;
            write_document(&tx, descriptor.name, &key, document)?;
        }

        tx.commit()?;
        debug!(index = descriptor.name, count = documents.len(), "Bulk loaded documents");
        Ok(documents.len())
    }

    fn add_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()> {
        let conn = self.conn.lock();
        let primary_key = create_index(&conn, name, PRIMARY_KEY)?;
        let key = document_key(name, &primary_key, document)?;
        write_document(&conn, name, &key, document)
    }

    fn update_document(&self, name: &str, document: &SearchDocument) -> IndexResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let primary_key = create_index(&tx, name, PRIMARY_KEY)?;
        let key = document_key(name, &primary_key, document)?;

        let merged = match read_document(&tx, name, &key)? {
            Some(mut existing) => {
                existing.merge(document.clone());
                existing
            }
            None => document.clone(),
        };

        write_document(&tx, name, &key, &merged)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_document(&self, name: &str, id: &str) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM documents WHERE index_name = ?1 AND doc_id = ?2",
            params![name, id],
        )?;
        Ok(())
    }

    fn search(
        &self,
        name: &str,
        query: &str,
        params: &SearchParams,
    ) -> IndexResult<SearchResults> {
        let conn = self.conn.lock();
        let primary_key =
            primary_key_of(&conn, name)?.ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;

        let total_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE index_name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        let match_expr = fts_query(query);
        let mut bindings: Vec<SqlValue> = vec![name.to_string().into()];
        let mut sql = String::from("SELECT d.body FROM documents d");

        if let Some(ref expr) = match_expr {
            sql.push_str(" JOIN documents_fts ON d.rowid = documents_fts.rowid");
            sql.push_str(" WHERE d.index_name = ? AND documents_fts MATCH ?");
            bindings.push(expr.clone().into());
        } else {
            sql.push_str(" WHERE d.index_name = ?");
        }

        let mut order = Vec::new();
        if let Some(ref field) = params.sort_field {
            validate_sort_field(field)?;
            let direction = match params.sort_order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            order.push(format!("json_extract(d.body, ?) COLLATE NOCASE {}", direction));
            bindings.push(format!("$.{}", field).into());
        }
        if match_expr.is_some() {
            order.push("documents_fts.rank".to_string());
        }
        order.push("json_extract(d.body, ?)".to_string());
        bindings.push(format!("$.{}", primary_key).into());

        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        sql.push_str(" LIMIT ? OFFSET ?");
        bindings.push(SqlValue::Integer(params.limit as i64));
        bindings.push(SqlValue::Integer(params.offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let bodies = stmt
            .query_map(params_from_iter(bindings), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let hits = bodies
            .iter()
            .map(|body| parse_body(name, body))
            .collect::<IndexResult<Vec<_>>>()?;

        Ok(SearchResults {
            hits,
            total_count: total_count as u64,
        })
    }

    fn document_count(&self, name: &str) -> IndexResult<Option<u64>> {
        let conn = self.conn.lock();
        if primary_key_of(&conn, name)?.is_none() {
            return Ok(None);
        }
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE index_name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(Some(count as u64))
    }

    fn index_names(&self) -> IndexResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM search_indexes ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}

/// Register an index if missing and return its primary key field
fn create_index(conn: &Connection, name: &str, primary_key: &str) -> IndexResult<String> {
    conn.execute(
        "INSERT OR IGNORE INTO search_indexes (name, primary_key) VALUES (?1, ?2)",
        params![name, primary_key],
    )?;
    primary_key_of(conn, name)?.ok_or_else(|| IndexError::IndexNotFound(name.to_string()))
}

fn primary_key_of(conn: &Connection, name: &str) -> IndexResult<Option<String>> {
    let key = conn
        .query_row(
            "SELECT primary_key FROM search_indexes WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(key)
}

fn document_key(index: &str, primary_key: &str, document: &SearchDocument) -> IndexResult<String> {
    document
        .key(primary_key)
        .ok_or_else(|| IndexError::MalformedDocument {
            index: index.to_string(),
            reason: format!("missing integer or string '{}' field", primary_key),
        })
}

fn read_document(conn: &Connection, index: &str, key: &str) -> IndexResult<Option<SearchDocument>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE index_name = ?1 AND doc_id = ?2",
            params![index, key],
            |row| row.get(0),
        )
        .optional()?;

    body.map(|b| parse_body(index, &b)).transpose()
}

fn write_document(
    conn: &Connection,
    index: &str,
    key: &str,
    document: &SearchDocument,
) -> IndexResult<()> {
    let body = serde_json::to_string(document)?;
    let content = searchable_text(document);
    conn.execute(
        r#"
        INSERT INTO documents (index_name, doc_id, body, content) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(index_name, doc_id) DO UPDATE SET body = excluded.body, content = excluded.content
        "#,
        params![index, key, body, content],
    )?;
    Ok(())
}

fn parse_body(index: &str, body: &str) -> IndexResult<SearchDocument> {
    let value: Value = serde_json::from_str(body)?;
    SearchDocument::from_value(value).ok_or_else(|| IndexError::MalformedDocument {
        index: index.to_string(),
        reason: "stored document is not an object".to_string(),
    })
}

/// Flatten every string and number in a document into one text blob
fn searchable_text(document: &SearchDocument) -> String {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Number(n) => out.push(n.to_string()),
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            Value::Bool(_) | Value::Null => {}
        }
    }

    let mut parts = Vec::new();
    for value in document.fields().values() {
        collect(value, &mut parts);
    }
    parts.join(" ")
}

/// Build an FTS5 expression: every alphanumeric term quoted and prefix-matched
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"*", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
