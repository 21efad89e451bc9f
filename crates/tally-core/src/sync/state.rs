//! Per-request sync state machine
//!
//! ```text
//! RelationalPending ──► RelationalDone ──► IndexPending ──► IndexDone
//!        │                                      │
//!        ▼                                      ▼
//! RelationalFailed                         IndexFailed
//! ```

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::RecordId;

/// Where a single mutation stands between the two stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    RelationalPending,
    RelationalDone,
    IndexPending,
    IndexDone,
    RelationalFailed,
    IndexFailed,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::RelationalPending => "RELATIONAL_PENDING",
            SyncState::RelationalDone => "RELATIONAL_DONE",
            SyncState::IndexPending => "INDEX_PENDING",
            SyncState::IndexDone => "INDEX_DONE",
            SyncState::RelationalFailed => "RELATIONAL_FAILED",
            SyncState::IndexFailed => "INDEX_FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncState::IndexDone | SyncState::RelationalFailed | SyncState::IndexFailed
        )
    }

    /// Check whether `next` directly follows this state
    pub fn can_advance_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (SyncState::RelationalPending, SyncState::RelationalDone)
                | (SyncState::RelationalPending, SyncState::RelationalFailed)
                | (SyncState::RelationalDone, SyncState::IndexPending)
                | (SyncState::IndexPending, SyncState::IndexDone)
                | (SyncState::IndexPending, SyncState::IndexFailed)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of mutation being synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Save,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Save => "save",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// Tracks one mutation through the state machine, logging each step
#[derive(Debug)]
pub(crate) struct SyncRun {
    operation: Operation,
    index: &'static str,
    id: Option<RecordId>,
    state: SyncState,
}

impl SyncRun {
    pub(crate) fn start(operation: Operation, index: &'static str, id: Option<RecordId>) -> Self {
        let run = Self {
            operation,
            index,
            id,
            state: SyncState::RelationalPending,
        };
        debug!(%operation, index, id = ?id, state = %run.state, "Sync started");
        run
    }

    pub(crate) fn state(&self) -> SyncState {
        self.state
    }

    /// Record the id once the relational store has assigned it
    pub(crate) fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    pub(crate) fn advance(&mut self, next: SyncState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal sync transition {} -> {}",
            self.state,
            next
        );
        self.state = next;

        if next == SyncState::IndexFailed {
            warn!(
                operation = %self.operation,
                index = self.index,
                id = ?self.id,
                state = %next,
                "Relational store and search index have diverged"
            );
        } else {
            debug!(
                operation = %self.operation,
                index = self.index,
                id = ?self.id,
                state = %next,
                "Sync transition"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut run = SyncRun::start(Operation::Create, "eb_sales", None);
        assert_eq!(run.state(), SyncState::RelationalPending);

        run.advance(SyncState::RelationalDone);
        run.set_id(1);
        run.advance(SyncState::IndexPending);
        run.advance(SyncState::IndexDone);

        assert_eq!(run.state(), SyncState::IndexDone);
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_failure_states_are_terminal() {
        assert!(SyncState::RelationalFailed.is_terminal());
        assert!(SyncState::IndexFailed.is_terminal());
        assert!(!SyncState::IndexPending.is_terminal());

        assert!(!SyncState::RelationalFailed.can_advance_to(SyncState::IndexPending));
        assert!(!SyncState::IndexFailed.can_advance_to(SyncState::IndexDone));
    }

    #[test]
    fn test_index_is_never_touched_before_relational_write() {
        assert!(!SyncState::RelationalPending.can_advance_to(SyncState::IndexPending));
        assert!(!SyncState::RelationalPending.can_advance_to(SyncState::IndexDone));
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncState::IndexFailed.to_string(), "INDEX_FAILED");
        assert_eq!(Operation::Delete.to_string(), "delete");
    }
}
