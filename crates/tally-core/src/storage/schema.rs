//! SQLite schema for the canonical store
//!
//! This database is the source of truth. Every search index is rebuilt
//! from these tables.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- AUTOINCREMENT keeps deleted ids from being reissued, so a stale
        -- search document can never be mistaken for a new row.

        CREATE TABLE IF NOT EXISTS eb_relationships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            phone_number TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS eb_purchases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            relationship_id INTEGER REFERENCES eb_relationships(id),
            company_name TEXT NOT NULL DEFAULT '',
            vehicle_name TEXT NOT NULL DEFAULT '',
            vehicle_number TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            price REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS eb_inventory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            purchase_id INTEGER REFERENCES eb_purchases(id),
            part_name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS eb_sales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            relationship_id INTEGER REFERENCES eb_relationships(id),
            purchase_id INTEGER REFERENCES eb_purchases(id),
            inventory_id INTEGER REFERENCES eb_inventory(id),
            price REAL NOT NULL DEFAULT 0,
            date TEXT NOT NULL,
            credit INTEGER NOT NULL DEFAULT 0,
            returned INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS eb_miscellaneous (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            purchase_id INTEGER REFERENCES eb_purchases(id),
            description TEXT NOT NULL DEFAULT '',
            price REAL NOT NULL DEFAULT 0,
            date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS eb_users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL
        );

        -- Reference lookups (expansion and delete checks)
        CREATE INDEX IF NOT EXISTS idx_purchases_relationship_id ON eb_purchases(relationship_id);
        CREATE INDEX IF NOT EXISTS idx_inventory_purchase_id ON eb_inventory(purchase_id);
        CREATE INDEX IF NOT EXISTS idx_sales_relationship_id ON eb_sales(relationship_id);
        CREATE INDEX IF NOT EXISTS idx_sales_purchase_id ON eb_sales(purchase_id);
        CREATE INDEX IF NOT EXISTS idx_sales_inventory_id ON eb_sales(inventory_id);
        CREATE INDEX IF NOT EXISTS idx_miscellaneous_purchase_id ON eb_miscellaneous(purchase_id);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
