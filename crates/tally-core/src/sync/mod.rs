//! Synchronization between the relational store and the search index
//!
//! The relational store is the source of truth; every index is a derived
//! cache of one table. The [`Ledger`] applies each mutation to the store
//! first and only then pushes the projected document to the index.
//!
//! ## Failure policy
//!
//! 1. A relational failure aborts before the index is touched.
//! 2. An index failure after a committed relational write is reported as
//!    [`SyncError::Divergence`]; the write is not rolled back.
//! 3. [`Ledger::rebuild`] drops and reloads every index from the store and
//!    is the only repair for divergence.
//!
//! No retries happen anywhere in this module.
//!
//! ## Usage
//!
//! ```ignore
//! let ledger = Ledger::open(&config)?;
//!
//! let sale = ledger.create(&Sale::new(100.0, date))?;
//! let page = ledger.search::<Sale>(&PageRequest::default())?;
//! ```

mod error;
mod ledger;
mod page;
mod state;

pub use error::{SyncError, SyncResult};
pub use ledger::{
    IndexRebuild, IndexStatus, Ledger, LedgerSettings, RebuildOutcome, RebuildReport,
};
pub use page::{Page, PageRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use state::{Operation, SyncState};
