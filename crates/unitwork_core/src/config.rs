//! Unit of work configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a unit of work.
///
/// Can be built in code or deserialized from any serde format; missing
/// fields take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether to detect changes from snapshots, both at registration and
    /// in the commit sweep.
    pub enable_dirty_check: bool,

    /// Maximum rows per bulk insert statement.
    pub batch_size: usize,

    /// Whether to cancel and merge operations before scheduling.
    pub enable_operation_merge: bool,

    /// Maximum number of entities tracked as new, dirty or removed.
    pub max_entity_count: usize,

    /// Whether to emit per-registration and per-operation debug events.
    pub enable_detail_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_dirty_check: true,
            batch_size: 1000,
            enable_operation_merge: true,
            max_entity_count: 10_000,
            enable_detail_log: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether dirty checking is enabled.
    #[must_use]
    pub const fn dirty_check(mut self, value: bool) -> Self {
        self.enable_dirty_check = value;
        self
    }

    /// Sets the bulk insert batch size.
    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets whether operations are cancelled and merged before commit.
    #[must_use]
    pub const fn operation_merge(mut self, value: bool) -> Self {
        self.enable_operation_merge = value;
        self
    }

    /// Sets the tracked entity ceiling.
    #[must_use]
    pub const fn max_entity_count(mut self, count: usize) -> Self {
        self.max_entity_count = count;
        self
    }

    /// Sets whether detail logging is enabled.
    #[must_use]
    pub const fn detail_log(mut self, value: bool) -> Self {
        self.enable_detail_log = value;
        self
    }

    /// Returns the batch size to use at execution time (never zero).
    #[must_use]
    pub const fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        }
    }
}
