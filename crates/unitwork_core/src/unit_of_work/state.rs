//! Unit of work lifecycle state.

use super::registry::Registry;
use crate::dependency::DependencyManager;
use crate::error::{CoreError, CoreResult};
use crate::operation::Operation;
use crate::snapshot::SnapshotManager;

/// Lifecycle status of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Accepting registrations.
    Open,
    /// Committed. Terminal.
    Committed,
    /// Rolled back, explicitly or by a failed commit. Terminal.
    RolledBack,
}

impl WorkStatus {
    /// Returns true for the terminal states.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Everything guarded by the unit of work's lock.
#[derive(Debug)]
pub(crate) struct WorkState {
    pub(crate) status: WorkStatus,
    pub(crate) registry: Registry,
    pub(crate) snapshots: SnapshotManager,
    pub(crate) dependencies: DependencyManager,
    pub(crate) operations: Vec<Operation>,
}

impl WorkState {
    pub(crate) fn new(dependencies: DependencyManager) -> Self {
        Self {
            status: WorkStatus::Open,
            registry: Registry::default(),
            snapshots: SnapshotManager::new(),
            dependencies,
            operations: Vec::new(),
        }
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        match self.status {
            WorkStatus::Open => Ok(()),
            WorkStatus::Committed => Err(CoreError::invalid_state(
                "unit of work is already finished: committed",
            )),
            WorkStatus::RolledBack => Err(CoreError::invalid_state(
                "unit of work is already finished: rolled back",
            )),
        }
    }

    /// Moves to a terminal status and drops all tracked state.
    ///
    /// The dependency graph is kept.
    pub(crate) fn finish(&mut self, status: WorkStatus) {
        self.status = status;
        self.registry.clear();
        self.snapshots.clear();
        self.operations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_state_rejects_calls() {
        let mut state = WorkState::new(DependencyManager::new());
        assert!(state.ensure_open().is_ok());

        state.finish(WorkStatus::Committed);
        assert!(state.status.is_finished());
        assert!(matches!(
            state.ensure_open(),
            Err(CoreError::InvalidState { .. })
        ));
    }
}
