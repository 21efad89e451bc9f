//! The ledger: relational store plus search index, kept in step

use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::config::{Config, IndexBackend};
use crate::entity::{Entity, EntityKind};
use crate::index::{IndexError, MeiliIndex, SearchIndex, SearchParams, SqliteIndex};
use crate::models::{
    Inventory, Miscellaneous, Purchase, RecordId, RecordPatch, Relationship, Sale,
};
use crate::projection::SearchDocument;
use crate::storage::{Database, StorageError};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::page::{Page, PageRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::sync::state::{Operation, SyncRun, SyncState};

/// Knobs the ledger reads from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    /// Abort a rebuild at the first failing entity type
    pub stop_on_error: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            stop_on_error: false,
        }
    }
}

impl From<&Config> for LedgerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_page_limit: config.default_page_limit,
            max_page_limit: config.max_page_limit,
            stop_on_error: config.rebuild.stop_on_error,
        }
    }
}

/// Result of rebuilding one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RebuildOutcome {
    Loaded { documents: usize },
    Failed { error: String },
    /// Not attempted because an earlier type failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRebuild {
    pub kind: EntityKind,
    pub index: &'static str,
    #[serde(flatten)]
    pub outcome: RebuildOutcome,
}

/// Per-index outcomes of a full rebuild, in rebuild order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RebuildReport {
    pub indexes: Vec<IndexRebuild>,
}

impl RebuildReport {
    pub fn is_success(&self) -> bool {
        self.indexes
            .iter()
            .all(|i| matches!(i.outcome, RebuildOutcome::Loaded { .. }))
    }

    pub fn total_documents(&self) -> usize {
        self.indexes
            .iter()
            .map(|i| match i.outcome {
                RebuildOutcome::Loaded { documents } => documents,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &IndexRebuild> {
        self.indexes
            .iter()
            .filter(|i| matches!(i.outcome, RebuildOutcome::Failed { .. }))
    }
}

/// Row and document counts for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub kind: EntityKind,
    pub index: &'static str,
    pub rows: u64,
    /// `None` when the index doesn't exist yet
    pub documents: Option<u64>,
}

impl IndexStatus {
    pub fn in_sync(&self) -> bool {
        self.documents == Some(self.rows)
    }
}

/// Coordinates every write across the relational store and search index
///
/// Writes land in the relational store first. On success the record is
/// re-read with its relations expanded, projected, and pushed to the index.
/// Reads go to the index only.
///
/// Mutations share a lock that [`rebuild`](Ledger::rebuild) takes
/// exclusively, so no write can slip between a rebuild's table read and
/// its bulk load. Searches never take the lock.
pub struct Ledger<I: SearchIndex = Box<dyn SearchIndex>> {
    database: Database,
    index: I,
    settings: LedgerSettings,
    rebuild_lock: RwLock<()>,
}

impl Ledger<Box<dyn SearchIndex>> {
    /// Open both stores from configuration
    ///
    /// Fails fast if the database can't be opened or the index backend
    /// doesn't answer a health check.
    pub fn open(config: &Config) -> SyncResult<Self> {
        let database = Database::open(config)?;

        let index: Box<dyn SearchIndex> = match config.index.backend {
            IndexBackend::Sqlite => Box::new(SqliteIndex::open(config)?),
            IndexBackend::Meilisearch => {
                let url = config.index.url.as_deref().ok_or_else(|| {
                    SyncError::Validation(
                        "index.url must be set when index.backend is meilisearch".to_string(),
                    )
                })?;
                Box::new(MeiliIndex::connect(
                    url,
                    config.index.api_key.clone(),
                    Duration::from_millis(config.index.task_timeout_ms),
                )?)
            }
        };
        index.health()?;

        let ledger = Self::new(database, index).with_settings(LedgerSettings::from(config));
        ledger.ensure_indexes()?;

        info!(backend = ?config.index.backend, "Ledger ready");
        Ok(ledger)
    }
}

impl<I: SearchIndex> Ledger<I> {
    pub fn new(database: Database, index: I) -> Self {
        Self {
            database,
            index,
            settings: LedgerSettings::default(),
            rebuild_lock: RwLock::new(()),
        }
    }

    pub fn with_settings(mut self, settings: LedgerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Create every index with its primary key and sortable fields
    ///
    /// A Meilisearch index created implicitly by its first document has no
    /// sortable attributes, and every read sorts.
    pub fn ensure_indexes(&self) -> SyncResult<()> {
        for kind in EntityKind::ALL {
            self.index.ensure_index(&kind.descriptor())?;
        }
        Ok(())
    }

    // ==================== Mutations ====================

    /// Create or fully replace a record, then replace its document
    pub fn save<E: Entity>(&self, record: &E) -> SyncResult<SearchDocument> {
        let _span = info_span!("save", index = E::TABLE, id = ?record.id()).entered();
        self.write::<E, _>(Operation::Save, record.id(), |db| db.upsert(record))
    }

    /// Create a record; an existing id is a conflict
    pub fn create<E: Entity>(&self, record: &E) -> SyncResult<SearchDocument> {
        let _span = info_span!("create", index = E::TABLE, id = ?record.id()).entered();
        self.write::<E, _>(Operation::Create, record.id(), |db| db.create(record))
    }

    /// Apply a partial update, then merge the new projection into its document
    pub fn update<E: Entity>(&self, patch: E::Patch) -> SyncResult<SearchDocument> {
        let id = patch.id();
        let _span = info_span!("update", index = E::TABLE, id).entered();
        self.write::<E, _>(Operation::Update, Some(id), |db| db.update::<E>(patch))
    }

    /// Delete a record and its document, returning the pre-deletion projection
    pub fn delete<E: Entity>(&self, id: RecordId) -> SyncResult<SearchDocument> {
        let _span = info_span!("delete", index = E::TABLE, id).entered();
        let _guard = self.rebuild_lock.read();
        let mut run = SyncRun::start(Operation::Delete, E::TABLE, Some(id));

        let snapshot = match self.database.delete::<E>(id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                run.advance(SyncState::RelationalFailed);
                return Err(e.into());
            }
        };
        run.advance(SyncState::RelationalDone);
        let document = E::project(&snapshot);

        run.advance(SyncState::IndexPending);
        if let Err(e) = self.index.delete_document(E::TABLE, &id.to_string()) {
            run.advance(SyncState::IndexFailed);
            return Err(diverged(Operation::Delete, E::TABLE, id, e));
        }
        run.advance(SyncState::IndexDone);

        Ok(document)
    }

    fn write<E, F>(
        &self,
        operation: Operation,
        id: Option<RecordId>,
        relational: F,
    ) -> SyncResult<SearchDocument>
    where
        E: Entity,
        F: FnOnce(&Database) -> Result<E, StorageError>,
    {
        let _guard = self.rebuild_lock.read();
        let mut run = SyncRun::start(operation, E::TABLE, id);

        let stored = match relational(&self.database) {
            Ok(stored) => stored,
            Err(e) => {
                run.advance(SyncState::RelationalFailed);
                return Err(e.into());
            }
        };
        run.advance(SyncState::RelationalDone);
        run.advance(SyncState::IndexPending);

        // The write is committed, so a row without an id can't be indexed
        let id = match stored.id() {
            Some(id) => id,
            None => {
                run.advance(SyncState::IndexFailed);
                let missing = StorageError::Serialization(format!("row in '{}' has no id", E::TABLE));
                return Err(diverged(operation, E::TABLE, id.unwrap_or_default(), missing));
            }
        };
        run.set_id(id);

        // Re-read so the document reflects relations as stored
        let document = match self.database.fetch_expanded::<E>(id) {
            Ok(expanded) => E::project(&expanded),
            Err(e) => {
                run.advance(SyncState::IndexFailed);
                return Err(diverged(operation, E::TABLE, id, e));
            }
        };

        let pushed = match operation {
            Operation::Update => self.index.update_document(E::TABLE, &document),
            _ => self.index.add_document(E::TABLE, &document),
        };
        if let Err(e) = pushed {
            run.advance(SyncState::IndexFailed);
            return Err(diverged(operation, E::TABLE, id, e));
        }
        run.advance(SyncState::IndexDone);
        debug_assert!(run.state().is_terminal());

        Ok(document)
    }

    // ==================== Reads ====================

    /// Read one record from the relational store, projected
    pub fn fetch<E: Entity>(&self, id: RecordId) -> SyncResult<SearchDocument> {
        let expanded = self.database.fetch_expanded::<E>(id)?;
        Ok(E::project(&expanded))
    }

    /// Search one entity type's index
    ///
    /// An index that hasn't been created yet reads as empty.
    pub fn search<E: Entity>(&self, request: &PageRequest) -> SyncResult<Page> {
        let limit = request.validate(
            self.settings.default_page_limit,
            self.settings.max_page_limit,
            E::SORTABLE,
        )?;

        let (page, limit, offset) = if request.get_all {
            let count = self.index.document_count(E::TABLE)?.unwrap_or(0) as usize;
            (1, count.max(1), 0)
        } else {
            (request.page, limit, request.offset(limit))
        };

        let params = SearchParams {
            limit,
            offset,
            sort_field: Some(request.order_by.clone()),
            sort_order: request.sort_order,
        };

        let results = match self.index.search(E::TABLE, &request.query, &params) {
            Ok(results) => results,
            Err(IndexError::IndexNotFound(_)) => Default::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Page {
            page,
            page_limit: limit,
            order_by: request.order_by.clone(),
            sort_order: request.sort_order,
            query: request.query.clone(),
            total_count: results.total_count,
            total_matched_count: results.hits.len(),
            records: results.hits,
        })
    }

    /// Row and document counts for every managed entity type
    pub fn status(&self) -> SyncResult<Vec<IndexStatus>> {
        EntityKind::ALL
            .iter()
            .map(|&kind| {
                let rows = match kind {
                    EntityKind::Relationships => self.database.count::<Relationship>()?,
                    EntityKind::Purchases => self.database.count::<Purchase>()?,
                    EntityKind::Inventory => self.database.count::<Inventory>()?,
                    EntityKind::Sales => self.database.count::<Sale>()?,
                    EntityKind::Miscellaneous => self.database.count::<Miscellaneous>()?,
                };
                Ok(IndexStatus {
                    kind,
                    index: kind.table(),
                    rows: rows as u64,
                    documents: self.index.document_count(kind.table())?,
                })
            })
            .collect()
    }

    // ==================== Rebuild ====================

    /// Drop and reload every index from the relational store
    ///
    /// Runs exclusively with respect to mutations through this ledger.
    pub fn rebuild(&self) -> RebuildReport {
        let _span = info_span!("rebuild").entered();
        let _guard = self.rebuild_lock.write();
        info!("Rebuilding search indexes");

        let mut report = RebuildReport::default();
        let mut stopped = false;

        for kind in EntityKind::ALL {
            let outcome = if stopped {
                RebuildOutcome::Skipped
            } else {
                match self.rebuild_kind(kind) {
                    Ok(documents) => {
                        info!(index = kind.table(), documents, "Rebuilt index");
                        RebuildOutcome::Loaded { documents }
                    }
                    Err(e) => {
                        warn!(index = kind.table(), error = %e, "Failed to rebuild index");
                        stopped = self.settings.stop_on_error;
                        RebuildOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            };

            report.indexes.push(IndexRebuild {
                kind,
                index: kind.table(),
                outcome,
            });
        }

        report
    }

    fn rebuild_kind(&self, kind: EntityKind) -> SyncResult<usize> {
        match kind {
            EntityKind::Relationships => self.rebuild_index::<Relationship>(),
            EntityKind::Purchases => self.rebuild_index::<Purchase>(),
            EntityKind::Inventory => self.rebuild_index::<Inventory>(),
            EntityKind::Sales => self.rebuild_index::<Sale>(),
            EntityKind::Miscellaneous => self.rebuild_index::<Miscellaneous>(),
        }
    }

    fn rebuild_index<E: Entity>(&self) -> SyncResult<usize> {
        self.index.drop_index(E::TABLE)?;
        let rows = self.database.find_all_expanded::<E>()?;
        let documents = rows.iter().map(E::project).collect();
        Ok(self.index.bulk_load(&E::descriptor(), documents)?)
    }
}

fn diverged<E>(operation: Operation, index: &'static str, id: RecordId, source: E) -> SyncError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SyncError::Divergence {
        operation,
        index,
        id,
        source: Box::new(source),
    }
}
