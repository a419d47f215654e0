//! Host integration hooks.
//!
//! A host (an ORM, a repository layer, a request pipeline) calls these hooks
//! around its own writes, reads and transaction boundaries. The hooks decide
//! whether a write is deferred into a unit of work or left to the host.
//!
//! Hooks are keyed by a [`ScopeId`] that the host assigns to each logical
//! transaction.

mod auto;

pub use auto::{AutoUnitOfWork, HookConfig};

use crate::entity::EntityRef;
use crate::error::CoreResult;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// Identifier of one logical transaction in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Wraps a host-assigned value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocates a process-unique scope.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SCOPE.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope:{}", self.0)
    }
}

/// The kind of write the host is about to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Insert.
    Create,
    /// Update.
    Update,
    /// Delete.
    Delete,
}

/// A transaction boundary in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionBoundary {
    /// A logical transaction starts.
    Begin,
    /// A logical transaction commits.
    Commit,
    /// A logical transaction rolls back.
    Rollback,
}

/// What the host should do with a write after [`HostHooks::before_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Perform the write against the store as usual.
    Proceed,
    /// The write was deferred; this many entities were registered.
    Registered(usize),
}

/// Callbacks a host invokes around its data access.
pub trait HostHooks: Send + Sync {
    /// Called before the host writes `entities`.
    ///
    /// # Errors
    ///
    /// Returns the registration error if an entity cannot be deferred.
    fn before_write(
        &self,
        scope: ScopeId,
        kind: WriteKind,
        entities: &[EntityRef],
    ) -> CoreResult<HookOutcome>;

    /// Called after the host loaded `entities`. Returns how many were
    /// snapshotted.
    ///
    /// # Errors
    ///
    /// Returns the snapshot error if an entity cannot be captured.
    fn after_read(&self, scope: ScopeId, entities: &[EntityRef]) -> CoreResult<usize>;

    /// Called at a transaction boundary.
    ///
    /// # Errors
    ///
    /// Returns the commit or rollback error of the bound unit of work.
    fn on_transaction_boundary(
        &self,
        scope: ScopeId,
        boundary: TransactionBoundary,
    ) -> CoreResult<()>;
}
