//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same primary key already exists.
    #[error("duplicate key: table {table}, id {id}")]
    DuplicateKey {
        /// The table written to.
        table: String,
        /// The conflicting primary key.
        id: u64,
    },

    /// A write that requires a primary key was given a zero id.
    #[error("missing primary key for write to table {table}")]
    MissingPrimaryKey {
        /// The table written to.
        table: String,
    },

    /// The store refused the write.
    #[error("write rejected on table {table}: {reason}")]
    WriteRejected {
        /// The table written to.
        table: String,
        /// Why the write was rejected.
        reason: String,
    },

    /// The transaction was cancelled or its deadline passed.
    #[error("transaction cancelled")]
    Cancelled,

    /// The transaction was already committed or rolled back.
    #[error("transaction is closed")]
    Closed,

    /// Backend-specific failure reported by an adapter.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a write rejected error.
    pub fn write_rejected(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteRejected {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
