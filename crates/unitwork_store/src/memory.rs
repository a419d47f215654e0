//! In-memory relational store.

use crate::adapter::{RelationalStore, StoreTransaction};
use crate::cancel::CancelToken;
use crate::error::{StoreError, StoreResult};
use crate::row::{Columns, Predicate, Row};
use crate::stats::StoreStats;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
struct Table {
    /// Highest primary key ever handed out or written.
    last_id: u64,
    rows: BTreeMap<u64, Columns>,
}

type Tables = HashMap<String, Table>;

/// An in-memory relational store.
///
/// This store keeps every table in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral data that doesn't need persistence
///
/// # Transactions
///
/// Only one write transaction runs at a time; `begin` blocks until the
/// previous one finishes. A transaction works on a private copy of all
/// tables that replaces the published tables on commit.
///
/// # Example
///
/// ```rust
/// use unitwork_store::{CancelToken, MemoryStore, RelationalStore, Row};
///
/// let store = MemoryStore::new();
/// let mut tx = store.begin(&CancelToken::new()).unwrap();
/// let id = tx.create("users", Row::new(0, Default::default())).unwrap();
/// drop(tx);
///
/// // Never committed, so never visible.
/// assert!(store.get("users", id).is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    write_lock: Mutex<()>,
    rejected: RwLock<HashSet<String>>,
    stats: StoreStats,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a committed row by primary key.
    #[must_use]
    pub fn get(&self, table: &str, id: u64) -> Option<Row> {
        self.tables
            .read()
            .get(table)
            .and_then(|t| t.rows.get(&id))
            .map(|columns| Row::new(id, columns.clone()))
    }

    /// Returns all committed rows of a table, ordered by primary key.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(id, columns)| Row::new(*id, columns.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of committed rows in a table.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.rows.len())
    }

    /// Returns the names of all tables that have ever been written.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the live statistics.
    #[must_use]
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Makes every subsequent write to `table` fail with
    /// [`StoreError::WriteRejected`].
    ///
    /// Useful for exercising failure paths in tests.
    pub fn reject_writes(&self, table: impl Into<String>) {
        self.rejected.write().insert(table.into());
    }

    /// Lifts a rejection installed with [`reject_writes`](Self::reject_writes).
    pub fn allow_writes(&self, table: &str) {
        self.rejected.write().remove(table);
    }

    /// Removes every table.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.tables.write().clear();
    }

    fn check_writable(&self, table: &str) -> StoreResult<()> {
        if self.rejected.read().contains(table) {
            return Err(StoreError::write_rejected(table, "writes disabled"));
        }
        Ok(())
    }
}

impl RelationalStore for MemoryStore {
    fn begin(&self, token: &CancelToken) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        token.check()?;

        // Single writer: blocks until the previous transaction is done.
        let guard = self.write_lock.lock();
        token.check()?;

        let working = self.tables.read().clone();
        self.stats.record_begin();

        Ok(Box::new(MemoryTransaction {
            store: self,
            working,
            token: token.clone(),
            finished: false,
            _guard: guard,
        }))
    }
}

/// A write transaction on a [`MemoryStore`].
///
/// Holds the store's writer lock until it is committed, rolled back or
/// dropped. Dropping without commit discards all writes.
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    working: Tables,
    token: CancelToken,
    finished: bool,
    _guard: MutexGuard<'a, ()>,
}

impl MemoryTransaction<'_> {
    fn ensure_writable(&self, table: &str) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        self.token.check()?;
        self.store.check_writable(table)
    }

    fn insert_row(&mut self, table: &str, row: Row) -> StoreResult<u64> {
        let entry = self.working.entry(table.to_string()).or_default();
        let id = if row.id() == 0 {
            entry.last_id + 1
        } else {
            row.id()
        };

        if entry.rows.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                table: table.to_string(),
                id,
            });
        }

        entry.last_id = entry.last_id.max(id);
        entry.rows.insert(id, row.with_id(id).into_columns());
        Ok(id)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn create(&mut self, table: &str, row: Row) -> StoreResult<u64> {
        self.ensure_writable(table)?;
        let id = self.insert_row(table, row)?;
        self.store.stats.record_statement(1);
        Ok(id)
    }

    fn bulk_create(
        &mut self,
        table: &str,
        rows: Vec<Row>,
        batch_size: usize,
    ) -> StoreResult<Vec<u64>> {
        let batch_size = batch_size.max(1);
        let mut ids = Vec::with_capacity(rows.len());
        let mut rows = rows.into_iter().peekable();

        while rows.peek().is_some() {
            self.ensure_writable(table)?;
            let chunk: Vec<Row> = rows.by_ref().take(batch_size).collect();
            let written = chunk.len() as u64;
            for row in chunk {
                ids.push(self.insert_row(table, row)?);
            }
            self.store.stats.record_statement(written);
        }

        Ok(ids)
    }

    fn save(&mut self, table: &str, row: Row) -> StoreResult<u64> {
        self.ensure_writable(table)?;
        if row.id() == 0 {
            return Err(StoreError::MissingPrimaryKey {
                table: table.to_string(),
            });
        }

        let entry = self.working.entry(table.to_string()).or_default();
        let id = row.id();
        entry.last_id = entry.last_id.max(id);
        entry.rows.insert(id, row.into_columns());
        self.store.stats.record_statement(1);
        Ok(1)
    }

    fn save_where(&mut self, table: &str, row: Row, predicate: &Predicate) -> StoreResult<u64> {
        self.ensure_writable(table)?;

        let Some(entry) = self.working.get_mut(table) else {
            self.store.stats.record_statement(0);
            return Ok(0);
        };

        let matched: Vec<u64> = entry
            .rows
            .iter()
            .filter(|(id, columns)| predicate.matches(**id, columns))
            .map(|(id, _)| *id)
            .collect();

        for id in &matched {
            entry
                .rows
                .insert(*id, row.clone().with_id(*id).into_columns());
        }

        let affected = matched.len() as u64;
        self.store.stats.record_statement(affected);
        Ok(affected)
    }

    fn delete(&mut self, table: &str, id: u64) -> StoreResult<u64> {
        self.ensure_writable(table)?;
        let affected = self
            .working
            .get_mut(table)
            .and_then(|t| t.rows.remove(&id))
            .map_or(0, |_| 1);
        self.store.stats.record_statement(affected);
        Ok(affected)
    }

    fn bulk_delete(&mut self, table: &str, ids: &[u64]) -> StoreResult<u64> {
        self.ensure_writable(table)?;
        let mut affected = 0;
        if let Some(entry) = self.working.get_mut(table) {
            for id in ids {
                if entry.rows.remove(id).is_some() {
                    affected += 1;
                }
            }
        }
        self.store.stats.record_statement(affected);
        Ok(affected)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        self.token.check()?;

        *self.store.tables.write() = std::mem::take(&mut self.working);
        self.finished = true;
        self.store.stats.record_commit();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        self.finished = true;
        self.store.stats.record_rollback();
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.stats.record_rollback();
            tracing::debug!("memory transaction dropped without commit, discarding writes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn named(name: &str) -> Row {
        Row::new(
            0,
            [
                ("id".to_string(), json!(0)),
                ("name".to_string(), json!(name)),
            ]
            .into(),
        )
    }

    #[test]
    fn memory_new_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.count("users"), 0);
        assert!(store.table_names().is_empty());
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        let a = tx.create("users", named("a")).unwrap();
        let b = tx.create("users", named("b")).unwrap();
        tx.commit().unwrap();

        assert_eq!((a, b), (1, 2));
        assert_eq!(store.get("users", 2).unwrap().get("id"), Some(&json!(2)));
    }

    #[test]
    fn explicit_id_is_kept_and_advances_sequence() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        tx.create("users", named("a").with_id(10)).unwrap();
        let next = tx.create("users", named("b")).unwrap();
        tx.commit().unwrap();
        assert_eq!(next, 11);
    }

    #[test]
    fn duplicate_key_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        tx.create("users", named("a").with_id(3)).unwrap();
        let result = tx.create("users", named("b").with_id(3));
        assert!(matches!(result, Err(StoreError::DuplicateKey { id: 3, .. })));
    }

    #[test]
    fn uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin(&CancelToken::new()).unwrap();
            tx.create("users", named("a")).unwrap();
        }
        assert_eq!(store.count("users"), 0);
        assert_eq!(store.stats().snapshot().transactions_rolled_back, 1);
    }

    #[test]
    fn rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        tx.create("users", named("a")).unwrap();
        tx.rollback().unwrap();
        assert_eq!(store.count("users"), 0);
    }

    #[test]
    fn bulk_create_chunks_statements() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        let rows = (0..5).map(|i| named(&format!("u{i}"))).collect();
        let ids = tx.bulk_create("users", rows, 2).unwrap();
        tx.commit().unwrap();

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        let snap = store.stats().snapshot();
        assert_eq!(snap.statements, 3);
        assert_eq!(snap.rows_written, 5);
    }

    #[test]
    fn save_requires_primary_key() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        let result = tx.save("users", named("a"));
        assert!(matches!(result, Err(StoreError::MissingPrimaryKey { .. })));
    }

    #[test]
    fn save_upserts() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        assert_eq!(tx.save("users", named("a").with_id(4)).unwrap(), 1);
        assert_eq!(tx.save("users", named("b").with_id(4)).unwrap(), 1);
        tx.commit().unwrap();

        assert_eq!(store.count("users"), 1);
        assert_eq!(store.get("users", 4).unwrap().get("name"), Some(&json!("b")));
    }

    #[test]
    fn save_where_reports_matches() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        let mut row = named("a");
        let mut columns = row.clone().into_columns();
        columns.insert("revision".to_string(), json!(1));
        row = Row::new(0, columns);
        let id = tx.create("users", row.clone()).unwrap();

        let stale = Predicate::new().eq("id", id).eq("revision", 7);
        assert_eq!(tx.save_where("users", row.clone().with_id(id), &stale).unwrap(), 0);

        let current = Predicate::new().eq("id", id).eq("revision", 1);
        assert_eq!(tx.save_where("users", row.with_id(id), &current).unwrap(), 1);
    }

    #[test]
    fn save_where_on_unknown_table_affects_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        let affected = tx
            .save_where("ghosts", named("a").with_id(1), &Predicate::new().eq("id", 1))
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn delete_and_bulk_delete() {
        let store = MemoryStore::new();
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        for i in 0..4 {
            tx.create("users", named(&format!("u{i}"))).unwrap();
        }
        assert_eq!(tx.delete("users", 1).unwrap(), 1);
        assert_eq!(tx.delete("users", 1).unwrap(), 0);
        assert_eq!(tx.bulk_delete("users", &[2, 3, 99]).unwrap(), 2);
        tx.commit().unwrap();

        assert_eq!(store.count("users"), 1);
        assert!(store.get("users", 4).is_some());
    }

    #[test]
    fn rejected_table_fails_writes() {
        let store = MemoryStore::new();
        store.reject_writes("users");
        let mut tx = store.begin(&CancelToken::new()).unwrap();
        let result = tx.create("users", named("a"));
        assert!(matches!(result, Err(StoreError::WriteRejected { .. })));

        store.allow_writes("users");
        assert!(tx.create("users", named("a")).is_ok());
    }

    #[test]
    fn cancelled_token_blocks_begin() {
        let store = MemoryStore::new();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(store.begin(&token), Err(StoreError::Cancelled)));
    }

    #[test]
    fn cancel_mid_transaction_prevents_commit() {
        let store = MemoryStore::new();
        let token = CancelToken::new();
        let mut tx = store.begin(&token).unwrap();
        tx.create("users", named("a")).unwrap();
        token.cancel();

        assert!(matches!(tx.create("users", named("b")), Err(StoreError::Cancelled)));
        assert!(matches!(tx.commit(), Err(StoreError::Cancelled)));
        assert_eq!(store.count("users"), 0);
    }

    #[test]
    fn writers_are_serialized() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut tx = store.begin(&CancelToken::new()).unwrap();
                    for j in 0..25 {
                        tx.create("users", named(&format!("{i}-{j}"))).unwrap();
                    }
                    tx.commit().unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count("users"), 100);
        let ids: Vec<u64> = store.rows("users").iter().map(Row::id).collect();
        assert_eq!(ids, (1..=100).collect::<Vec<_>>());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bulk_create_issues_one_statement_per_chunk(count in 0usize..64, batch in 0usize..10) {
                let store = MemoryStore::new();
                let mut tx = store.begin(&CancelToken::new()).unwrap();
                let rows = (0..count).map(|i| named(&format!("u{i}"))).collect();
                let ids = tx.bulk_create("users", rows, batch).unwrap();
                tx.commit().unwrap();

                let chunk = batch.max(1);
                prop_assert_eq!(ids, (1..=count as u64).collect::<Vec<_>>());
                prop_assert_eq!(store.stats().snapshot().statements, count.div_ceil(chunk) as u64);
                prop_assert_eq!(store.count("users"), count);
            }

            #[test]
            fn rolled_back_writes_are_invisible(names in prop::collection::vec("[a-z]{1,6}", 1..16)) {
                let store = MemoryStore::new();
                let mut tx = store.begin(&CancelToken::new()).unwrap();
                for name in &names {
                    tx.create("users", named(name)).unwrap();
                }
                tx.rollback().unwrap();

                prop_assert_eq!(store.count("users"), 0);
                prop_assert_eq!(store.stats().snapshot().transactions_rolled_back, 1);
            }
        }
    }
}
