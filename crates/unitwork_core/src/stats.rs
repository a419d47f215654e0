//! Unit of work statistics.
//!
//! Observability only; nothing in the commit path reads these values.

use serde::Serialize;

/// Counts of tracked entities and pending operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnitOfWorkStats {
    /// Entities registered as new.
    pub new_entities: usize,
    /// Entities registered as dirty.
    pub dirty_entities: usize,
    /// Entities registered for removal.
    pub removed_entities: usize,
    /// Entities tracked as clean.
    pub clean_entities: usize,
    /// Snapshots held.
    pub snapshots: usize,
    /// Pending operations.
    pub total_operations: usize,
    /// The unit of work committed.
    pub is_committed: bool,
    /// The unit of work was rolled back.
    pub is_rolled_back: bool,
}

impl UnitOfWorkStats {
    /// Entities tracked as new, dirty or removed.
    #[must_use]
    pub const fn pending_entities(&self) -> usize {
        self.new_entities + self.dirty_entities + self.removed_entities
    }

    /// True once committed or rolled back.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.is_committed || self.is_rolled_back
    }
}
