//! Error types for unitwork core.

use crate::entity::ValidationError;
use crate::operation::OperationKind;
use thiserror::Error;
use unitwork_store::StoreError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in unitwork core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An entity failed its own validation.
    #[error("validation failed for {entity}: {source}")]
    Validation {
        /// The entity that failed, as `Type#id`.
        entity: String,
        /// What the entity reported.
        source: ValidationError,
    },

    /// A revisioned update matched no row.
    #[error("optimistic lock failed for {entity}: revision {revision} is stale")]
    OptimisticLock {
        /// The entity that failed, as `Type#id`.
        entity: String,
        /// The revision the update expected to find.
        revision: u64,
    },

    /// The dependency graph has no valid order for the types involved.
    #[error("circular dependency between entity types: {}", types.join(", "))]
    CircularDependency {
        /// Types that could not be ordered, sorted by name.
        types: Vec<String>,
    },

    /// Registration would exceed the configured entity ceiling.
    #[error("entity count limit exceeded: {count} >= {limit}")]
    CapacityExceeded {
        /// Entities tracked at the time of the call.
        count: usize,
        /// The configured ceiling.
        limit: usize,
    },

    /// The call is not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the call is invalid.
        message: String,
    },

    /// The relational store reported an error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),

    /// An operation failed during commit.
    #[error("operation {index} ({kind} {entity_type}#{entity_id}) failed: {source}")]
    OperationFailed {
        /// Position of the operation in the execution order.
        index: usize,
        /// Kind of the failed operation.
        kind: OperationKind,
        /// Entity type of the failed operation.
        entity_type: String,
        /// Primary key of the first target entity.
        entity_id: u64,
        /// The underlying failure.
        source: Box<CoreError>,
    },

    /// The commit was cancelled or its deadline passed.
    #[error("commit cancelled")]
    Cancelled,

    /// An entity's fields could not be captured.
    #[error("field extraction failed for {entity_type}: {message}")]
    FieldExtraction {
        /// Entity type whose fields were read.
        entity_type: String,
        /// Serializer message.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a field extraction error.
    pub fn field_extraction(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FieldExtraction {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }

    /// Returns the innermost error, looking through [`CoreError::OperationFailed`].
    #[must_use]
    pub fn root(&self) -> &CoreError {
        let mut current = self;
        while let Self::OperationFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns the execution index of the failed operation, if any.
    #[must_use]
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            Self::OperationFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Returns true if the root cause is an optimistic lock failure.
    #[must_use]
    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self.root(), Self::OptimisticLock { .. })
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Store(other),
        }
    }
}
