//! Relational store adapter
//!
//! The canonical store for every entity. One generic implementation
//! serves all entity types through the [`Entity`] trait.
//!
//! Write semantics:
//! - `upsert` replaces every column on primary key conflict
//! - `create` fails with `Conflict` if the key is taken
//! - `update` applies a typed patch inside a transaction; omitted fields
//!   keep their stored value, explicit values (including `false`) are written

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::config::Config;
use crate::entity::Entity;
use crate::models::{RecordId, RecordPatch, User};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{init_schema, needs_init};

const USERS_TABLE: &str = "eb_users";

/// Thread-safe handle to the canonical SQLite database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database described by the configuration
    pub fn open(config: &Config) -> StorageResult<Self> {
        Self::open_path(&config.database_path())
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> StorageResult<Self> {
        info!(path = ?path, "Opening relational store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            debug!("Initializing relational schema");
            init_schema(&conn)?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Writes ====================

    /// Insert, or replace every column of the row with the same id
    pub fn upsert<E: Entity>(&self, record: &E) -> StorageResult<E> {
        let conn = self.conn.lock();
        let assignments = E::COLUMNS
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} (id, {}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            E::TABLE,
            E::COLUMNS.join(", "),
            placeholders(E::COLUMNS.len() + 1),
            assignments,
        );

        let id = write_row(&conn, &sql, record)?;
        debug!(table = E::TABLE, id, "Upserted record");
        select_row::<E>(&conn, id)
    }

    /// Insert a new row; an existing id is a conflict
    pub fn create<E: Entity>(&self, record: &E) -> StorageResult<E> {
        let conn = self.conn.lock();
        let sql = format!(
            "INSERT INTO {} (id, {}) VALUES ({})",
            E::TABLE,
            E::COLUMNS.join(", "),
            placeholders(E::COLUMNS.len() + 1),
        );

        let id = write_row(&conn, &sql, record)?;
        debug!(table = E::TABLE, id, "Created record");
        select_row::<E>(&conn, id)
    }

    /// Apply a partial update to an existing row
    pub fn update<E: Entity>(&self, patch: E::Patch) -> StorageResult<E> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let id = patch.id();

        let mut record = select_row::<E>(&tx, id)?;
        patch.apply_to(&mut record);

        let assignments = E::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", c, i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE id = ?1", E::TABLE, assignments);

        let mut values = vec![rusqlite::types::Value::Integer(id)];
        values.extend(record.values());
        tx.execute(&sql, params_from_iter(values))
            .map_err(|e| StorageError::from_sqlite(e, E::TABLE))?;

        let updated = select_row::<E>(&tx, id)?;
        tx.commit()?;
        debug!(table = E::TABLE, id, "Updated record");
        Ok(updated)
    }

    /// Delete a row, returning its expanded pre-deletion snapshot
    pub fn delete<E: Entity>(&self, id: RecordId) -> StorageResult<E::Expanded> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let record = select_row::<E>(&tx, id)?;
        let snapshot = E::expand(&tx, record)?;

        tx.execute(&format!("DELETE FROM {} WHERE id = ?1", E::TABLE), params![id])
            .map_err(|e| StorageError::from_sqlite(e, E::TABLE))?;
        tx.commit()?;

        debug!(table = E::TABLE, id, "Deleted record");
        Ok(snapshot)
    }

    // ==================== Reads ====================

    /// Get a single row by id
    pub fn get<E: Entity>(&self, id: RecordId) -> StorageResult<Option<E>> {
        let conn = self.conn.lock();
        load::<E>(&conn, id)
    }

    /// Get a row with its related entities resolved
    pub fn fetch_expanded<E: Entity>(&self, id: RecordId) -> StorageResult<E::Expanded> {
        let conn = self.conn.lock();
        let record = select_row::<E>(&conn, id)?;
        E::expand(&conn, record)
    }

    /// Read the whole table, ordered by id
    pub fn find_all<E: Entity>(&self) -> StorageResult<Vec<E>> {
        let conn = self.conn.lock();
        find_all_rows::<E>(&conn)
    }

    /// Read and expand the whole table in one consistent pass
    pub fn find_all_expanded<E: Entity>(&self) -> StorageResult<Vec<E::Expanded>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let rows = find_all_rows::<E>(&tx)?;
        let expanded = rows
            .into_iter()
            .map(|record| E::expand(&tx, record))
            .collect::<StorageResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(expanded)
    }

    pub fn count<E: Entity>(&self) -> StorageResult<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", E::TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    // ==================== Users ====================

    /// Register a user; emails are unique
    pub fn create_user(&self, user: &User) -> StorageResult<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO eb_users (id, name, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.name, user.email, user.password_hash],
        )
        .map_err(|e| StorageError::from_sqlite(e, USERS_TABLE))?;

        let id = user.id.unwrap_or_else(|| conn.last_insert_rowid());
        Ok(User {
            id: Some(id),
            ..user.clone()
        })
    }

    pub fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, name, email, password_hash FROM eb_users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        password_hash: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

/// Load a row by id, `None` if it doesn't exist
pub(crate) fn load<E: Entity>(conn: &Connection, id: RecordId) -> StorageResult<Option<E>> {
    let sql = format!(
        "SELECT id, {} FROM {} WHERE id = ?1",
        E::COLUMNS.join(", "),
        E::TABLE
    );
    let row = conn.query_row(&sql, params![id], E::from_row).optional()?;
    Ok(row)
}

/// Follow a nullable reference
pub(crate) fn load_ref<E: Entity>(
    conn: &Connection,
    id: Option<RecordId>,
) -> StorageResult<Option<E>> {
    match id {
        Some(id) => load::<E>(conn, id),
        None => Ok(None),
    }
}

fn select_row<E: Entity>(conn: &Connection, id: RecordId) -> StorageResult<E> {
    load::<E>(conn, id)?.ok_or(StorageError::NotFound {
        table: E::TABLE,
        id,
    })
}

fn find_all_rows<E: Entity>(conn: &Connection) -> StorageResult<Vec<E>> {
    let sql = format!(
        "SELECT id, {} FROM {} ORDER BY id",
        E::COLUMNS.join(", "),
        E::TABLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], E::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Run an insert statement bound as `id, COLUMNS...` and return the row id
fn write_row<E: Entity>(conn: &Connection, sql: &str, record: &E) -> StorageResult<RecordId> {
    let mut values = vec![rusqlite::types::Value::from(record.id())];
    values.extend(record.values());

    conn.execute(sql, params_from_iter(values))
        .map_err(|e| StorageError::from_sqlite(e, E::TABLE))?;

    Ok(record.id().unwrap_or_else(|| conn.last_insert_rowid()))
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
