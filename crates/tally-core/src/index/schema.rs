//! SQLite schema for the local search index
//!
//! Documents are stored as JSON per named index. A flattened text column
//! feeds an FTS5 table, kept in sync by triggers.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the index schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- One row per named index
        CREATE TABLE IF NOT EXISTS search_indexes (
            name TEXT PRIMARY KEY,
            primary_key TEXT NOT NULL
        );

        -- Documents keyed by (index, primary key value)
        CREATE TABLE IF NOT EXISTS documents (
            index_name TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            body TEXT NOT NULL,
            content TEXT NOT NULL,
            PRIMARY KEY (index_name, doc_id),
            FOREIGN KEY (index_name) REFERENCES search_indexes(name) ON DELETE CASCADE
        );

        -- Full-text search over the flattened document text
        CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
            content,
            content='documents',
            content_rowid='rowid'
        );

        CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
        END;

        CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, content)
            VALUES ('delete', OLD.rowid, OLD.content);
        END;

        CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, content)
            VALUES ('delete', OLD.rowid, OLD.content);
            INSERT INTO documents_fts(rowid, content) VALUES (NEW.rowid, NEW.content);
        END;
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let version: Option<i32> = conn
        .query_row(
            "SELECT value FROM schema_info WHERE key = 'version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .ok()
        .and_then(|v| v.parse().ok());

    match version {
        Some(v) => v < SCHEMA_VERSION,
        None => true,
    }
}
