//! Tally Core Library
//!
//! Bookkeeping records (relationships, purchases, inventory, sales and
//! miscellaneous expenses) kept in a relational store and mirrored into a
//! search index for filtered, sorted, paginated lookups.
//!
//! # Architecture
//!
//! - **SQLite**: source of truth for every record
//! - **Search index**: derived copy, one index per entity type, either a
//!   local SQLite/FTS5 database or a Meilisearch server
//!
//! Writes go to SQLite first and are then projected into the index.
//! Reads are served by the index.
//!
//! # Quick Start
//!
//! ```text
//! let ledger = Ledger::open(&Config::load()?)?;
//!
//! // Add a record
//! let sale = ledger.create(&Sale::new(100.0, date))?;
//!
//! // Query records
//! let page = ledger.search::<Sale>(&PageRequest::default())?;
//! ```
//!
//! # Modules
//!
//! - `sync`: the ledger coordinating both stores (main entry point)
//! - `models`: records, users and partial-update patches
//! - `entity`: per-entity table, index and expansion metadata
//! - `projection`: expanded records to flat search documents
//! - `storage`: the relational store
//! - `index`: search index backends
//! - `config`: application configuration

pub mod config;
pub mod entity;
pub mod index;
pub mod models;
pub mod projection;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use entity::{Entity, EntityKind, IndexDescriptor};
pub use index::{IndexError, MeiliIndex, SearchIndex, SortOrder, SqliteIndex};
pub use models::{
    Inventory, InventoryPatch, Miscellaneous, MiscellaneousPatch, Purchase, PurchasePatch,
    RecordId, Relationship, RelationshipPatch, Sale, SalePatch, User,
};
pub use projection::SearchDocument;
pub use storage::{Database, StorageError};
pub use sync::{Ledger, Page, PageRequest, RebuildReport, SyncError};
