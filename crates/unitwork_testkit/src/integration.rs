//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] remembers which entities a test expects to find in
//! the store and checks the committed rows against their live field values.

use crate::fixtures::TestStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use unitwork_core::entity::{EntityRef, FieldSource};
use unitwork_core::{CoreResult, UnitOfWork};
use unitwork_store::{
    CancelToken, MemoryStore, Predicate, RelationalStore, Row, StoreResult, StoreTransaction,
};

/// A store plus the set of entities expected to be persisted.
#[derive(Debug, Default)]
pub struct IntegrationHarness {
    /// The store under test.
    pub store: TestStore,
    tracked: Vec<EntityRef>,
    removed: BTreeMap<String, Vec<u64>>,
}

impl IntegrationHarness {
    /// Creates a harness over an empty store.
    pub fn new() -> Self {
        Self {
            store: TestStore::new(),
            ..Self::default()
        }
    }

    /// Runs `f` in a fresh shop-ordered unit of work and commits it.
    ///
    /// # Errors
    ///
    /// Returns the closure's error or the commit error.
    pub fn commit(&self, f: impl FnOnce(&UnitOfWork) -> CoreResult<()>) -> CoreResult<()> {
        let uow = self.store.shop_uow();
        f(&uow)?;
        uow.commit()
    }

    /// Expects `entity` to be stored with its current field values.
    pub fn expect_stored(&mut self, entity: impl Into<EntityRef>) {
        self.tracked.push(entity.into());
    }

    /// Expects the row `table#id` to be absent.
    pub fn expect_absent(&mut self, table: &str, id: u64) {
        self.removed.entry(table.to_string()).or_default().push(id);
    }

    /// Asserts every expectation.
    pub fn verify_all(&self) {
        for entity in &self.tracked {
            let (table, id, expected) = {
                let guard = entity.read();
                let fields = guard.field_values().expect("Failed to capture fields");
                (guard.table_name().to_string(), guard.id(), fields)
            };
            let row = self
                .store
                .get(&table, id)
                .unwrap_or_else(|| panic!("{table}#{id} should be stored"));
            assert_eq!(row.columns(), &expected, "Row mismatch for {table}#{id}");
        }

        for (table, ids) in &self.removed {
            for id in ids {
                assert!(
                    self.store.get(table, *id).is_none(),
                    "{table}#{id} should be absent"
                );
            }
        }
    }

    /// Returns the number of entities expected to be stored.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }
}

/// One write observed by a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Adapter method name, such as `create` or `bulk_delete`.
    pub action: &'static str,
    /// Target table.
    pub table: String,
    /// Primary keys written.
    pub ids: Vec<u64>,
}

/// A [`MemoryStore`] that records every write in execution order.
///
/// Calls of transactions that are rolled back stay recorded.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<StoreCall>>,
}

impl RecordingStore {
    /// Creates an empty recording store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Returns every recorded write.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Returns the tables written by `actions`, in order.
    pub fn tables_for(&self, actions: &[&str]) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| actions.contains(&call.action))
            .map(|call| call.table.clone())
            .collect()
    }
}

impl RelationalStore for RecordingStore {
    fn begin(&self, token: &CancelToken) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let inner = self.inner.begin(token)?;
        Ok(Box::new(RecordingTransaction {
            inner,
            calls: &self.calls,
        }))
    }
}

struct RecordingTransaction<'a> {
    inner: Box<dyn StoreTransaction + 'a>,
    calls: &'a Mutex<Vec<StoreCall>>,
}

impl RecordingTransaction<'_> {
    fn record(&self, action: &'static str, table: &str, ids: Vec<u64>) {
        self.calls.lock().push(StoreCall {
            action,
            table: table.to_string(),
            ids,
        });
    }
}

impl StoreTransaction for RecordingTransaction<'_> {
    fn create(&mut self, table: &str, row: Row) -> StoreResult<u64> {
        let id = self.inner.create(table, row)?;
        self.record("create", table, vec![id]);
        Ok(id)
    }

    fn bulk_create(
        &mut self,
        table: &str,
        rows: Vec<Row>,
        batch_size: usize,
    ) -> StoreResult<Vec<u64>> {
        let ids = self.inner.bulk_create(table, rows, batch_size)?;
        self.record("bulk_create", table, ids.clone());
        Ok(ids)
    }

    fn save(&mut self, table: &str, row: Row) -> StoreResult<u64> {
        let id = row.id();
        let affected = self.inner.save(table, row)?;
        self.record("save", table, vec![id]);
        Ok(affected)
    }

    fn save_where(&mut self, table: &str, row: Row, predicate: &Predicate) -> StoreResult<u64> {
        let id = row.id();
        let affected = self.inner.save_where(table, row, predicate)?;
        self.record("save_where", table, vec![id]);
        Ok(affected)
    }

    fn delete(&mut self, table: &str, id: u64) -> StoreResult<u64> {
        let affected = self.inner.delete(table, id)?;
        self.record("delete", table, vec![id]);
        Ok(affected)
    }

    fn bulk_delete(&mut self, table: &str, ids: &[u64]) -> StoreResult<u64> {
        let affected = self.inner.bulk_delete(table, ids)?;
        self.record("bulk_delete", table, ids.to_vec());
        Ok(affected)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback()
    }
}
