//! Relational store adapter traits.

use crate::cancel::CancelToken;
use crate::error::StoreResult;
use crate::row::{Predicate, Row};

/// A relational store that units of work persist into.
///
/// Stores hand out [`StoreTransaction`]s. All writes made through a
/// transaction become visible together on `commit`, or not at all.
///
/// # Invariants
///
/// - A transaction dropped without `commit` leaves the store unchanged
/// - The cancel token passed to `begin` is honoured for the transaction's
///   whole lifetime
/// - Stores must be `Send + Sync` so they can be shared across threads
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
pub trait RelationalStore: Send + Sync {
    /// Begins a write transaction.
    ///
    /// May block until other writers finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is already cancelled or the backend
    /// cannot start a transaction.
    fn begin(&self, token: &CancelToken) -> StoreResult<Box<dyn StoreTransaction + '_>>;
}

/// An open write transaction against a [`RelationalStore`].
pub trait StoreTransaction {
    /// Inserts a row.
    ///
    /// A zero row id asks the store to assign the next primary key.
    /// Returns the primary key of the inserted row.
    ///
    /// # Errors
    ///
    /// Returns an error if the primary key already exists or the write fails.
    fn create(&mut self, table: &str, row: Row) -> StoreResult<u64>;

    /// Inserts rows in chunks of `batch_size`.
    ///
    /// Returns the primary keys in the order the rows were given.
    ///
    /// # Errors
    ///
    /// Returns the first error any chunk produced.
    fn bulk_create(
        &mut self,
        table: &str,
        rows: Vec<Row>,
        _batch_size: usize,
    ) -> StoreResult<Vec<u64>> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(self.create(table, row)?);
        }
        Ok(ids)
    }

    /// Writes a full row, inserting it if the primary key is unknown.
    ///
    /// Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the row has no primary key or the write fails.
    fn save(&mut self, table: &str, row: Row) -> StoreResult<u64>;

    /// Overwrites every row that matches `predicate` with `row`'s columns.
    ///
    /// Returns the number of rows affected, which is zero when nothing
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn save_where(&mut self, table: &str, row: Row, predicate: &Predicate) -> StoreResult<u64>;

    /// Physically deletes a row by primary key.
    ///
    /// Returns the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&mut self, table: &str, id: u64) -> StoreResult<u64>;

    /// Physically deletes many rows in one call.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn bulk_delete(&mut self, table: &str, ids: &[u64]) -> StoreResult<u64> {
        let mut affected = 0;
        for id in ids {
            affected += self.delete(table, *id)?;
        }
        Ok(affected)
    }

    /// Makes every write of this transaction durable and visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction was cancelled or the backend
    /// fails to commit; nothing is published in that case.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to roll back.
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}
