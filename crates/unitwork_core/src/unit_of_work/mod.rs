//! Unit of work coordinator.
//!
//! A [`UnitOfWork`] collects entity registrations, detects changes from
//! snapshots, and on [`commit`](UnitOfWork::commit) writes everything to
//! the store inside one transaction:
//!
//! 1. Sweep snapshots of clean entities and register the changed ones
//! 2. Cancel insert/delete pairs and merge operations (if enabled)
//! 3. Order inserts and deletes by the dependency graph
//! 4. Execute in order, aborting the transaction on the first error
//!
//! All state sits behind one `RwLock`. Registrations and commit take it
//! exclusively, so a commit never interleaves with registrations on the
//! same instance.

mod checkpoint;
mod optimize;
mod registry;
mod schedule;
mod state;

pub use state::WorkStatus;

use crate::config::Config;
use crate::dependency::DependencyManager;
use crate::entity::{Entity, EntityKey, EntityRef, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::operation::Operation;
use crate::snapshot::ChangeSet;
use crate::stats::UnitOfWorkStats;
use crate::types::UnitOfWorkId;
use checkpoint::Checkpoint;
use parking_lot::RwLock;
use registry::Tracking;
use state::WorkState;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use unitwork_store::{CancelToken, RelationalStore, StoreTransaction};

/// A transactional batch of entity mutations.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use serde::Serialize;
/// use unitwork_core::entity::{shared, Entity};
/// use unitwork_core::{Config, UnitOfWork};
/// use unitwork_store::MemoryStore;
///
/// #[derive(Serialize)]
/// struct Tag {
///     id: u64,
///     label: String,
/// }
///
/// impl Entity for Tag {
///     fn id(&self) -> u64 { self.id }
///     fn set_id(&mut self, id: u64) { self.id = id; }
///     fn table_name(&self) -> &str { "tags" }
/// }
///
/// let store = Arc::new(MemoryStore::new());
/// let uow = UnitOfWork::new(store.clone(), Config::default());
///
/// let tag = shared(Tag { id: 0, label: "rust".into() });
/// uow.register_new(&tag).unwrap();
/// uow.commit().unwrap();
///
/// assert_eq!(tag.read().id, 1);
/// assert_eq!(store.count("tags"), 1);
/// ```
pub struct UnitOfWork {
    id: UnitOfWorkId,
    store: Arc<dyn RelationalStore>,
    config: Config,
    state: RwLock<WorkState>,
    executing: AtomicBool,
}

/// Clears the executing flag when dropped.
struct ExecutingGuard<'a>(&'a AtomicBool);

impl<'a> ExecutingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl UnitOfWork {
    /// Creates a unit of work with an empty dependency graph.
    pub fn new(store: Arc<dyn RelationalStore>, config: Config) -> Self {
        Self::with_dependency_graph(store, config, DependencyManager::new())
    }

    /// Creates a unit of work starting from an existing dependency graph.
    pub fn with_dependency_graph(
        store: Arc<dyn RelationalStore>,
        config: Config,
        dependencies: DependencyManager,
    ) -> Self {
        let id = UnitOfWorkId::new();
        debug!(uow_id = %id, "unit of work created");
        Self {
            id,
            store,
            config,
            state: RwLock::new(WorkState::new(dependencies)),
            executing: AtomicBool::new(false),
        }
    }

    /// Returns the ID.
    #[must_use]
    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkStatus {
        self.state.read().status
    }

    /// Returns true once committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.status() == WorkStatus::Committed
    }

    /// Returns true once rolled back.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.status() == WorkStatus::RolledBack
    }

    /// Returns true once committed or rolled back.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    /// Returns true while a commit is writing to the store.
    ///
    /// Does not take the state lock.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    // ---- registration -------------------------------------------------

    /// Registers an entity to be inserted.
    ///
    /// Does nothing if the entity is already registered as new.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the unit of work is finished or the
    ///   entity is registered as dirty or removed
    /// - [`CoreError::CapacityExceeded`] if the entity ceiling is reached
    pub fn register_new(&self, entity: impl Into<EntityRef>) -> CoreResult<()> {
        let entity = entity.into();
        let key = entity.key();
        let mut state = self.state.write();
        state.ensure_open()?;

        match state.registry.tracking_of(&key) {
            Some(Tracking::New) => return Ok(()),
            Some(Tracking::Dirty) => {
                return Err(CoreError::invalid_state(format!(
                    "cannot register {key} as new: already registered as dirty"
                )))
            }
            Some(Tracking::Removed) => {
                return Err(CoreError::invalid_state(format!(
                    "cannot register {key} as new: already registered for removal"
                )))
            }
            Some(Tracking::Clean) | None => {}
        }

        let count = state.registry.pending();
        if count >= self.config.max_entity_count {
            warn!(uow_id = %self.id, count, limit = self.config.max_entity_count, "entity count limit exceeded");
            return Err(CoreError::CapacityExceeded {
                count,
                limit: self.config.max_entity_count,
            });
        }

        state.registry.track(Tracking::New, key, entity.clone());
        state.operations.push(Operation::Insert(entity));
        self.trace_registration("new", &key);
        Ok(())
    }

    /// Registers an entity to be updated.
    ///
    /// Does nothing if the entity is already new or dirty. With dirty
    /// checking enabled, the entity is only registered when it differs from
    /// its snapshot, so an entity that was never snapshotted is skipped.
    /// Without dirty checking it is always registered with an empty change
    /// set.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the unit of work is finished or the
    ///   entity is registered for removal
    /// - [`CoreError::FieldExtraction`] if the entity cannot be diffed
    pub fn register_dirty(&self, entity: impl Into<EntityRef>) -> CoreResult<()> {
        let entity = entity.into();
        let key = entity.key();
        let mut state = self.state.write();
        state.ensure_open()?;

        match state.registry.tracking_of(&key) {
            Some(Tracking::New | Tracking::Dirty) => return Ok(()),
            Some(Tracking::Removed) => {
                return Err(CoreError::invalid_state(format!(
                    "cannot mark {key} dirty: already registered for removal"
                )))
            }
            Some(Tracking::Clean) | None => {}
        }

        let changes = if self.config.enable_dirty_check {
            let Some(snapshot) = state.snapshots.snapshot_of(&entity) else {
                self.trace_registration("dirty-unsnapshotted", &key);
                return Ok(());
            };
            let captured = *snapshot.key();
            let changes = snapshot.changes_to(&entity.read().field_values()?);
            if captured != key {
                if matches!(state.registry.tracking_of(&captured), Some(Tracking::Clean)) {
                    state.registry.untrack(&captured);
                }
            } else if changes.is_empty() {
                self.trace_registration("dirty-unchanged", &key);
                return Ok(());
            }
            changes
        } else {
            ChangeSet::new()
        };

        state.registry.track(Tracking::Dirty, key, entity.clone());
        state.operations.push(Operation::update(entity, changes));
        self.trace_registration("dirty", &key);
        Ok(())
    }

    /// Registers an entity to be deleted.
    ///
    /// An entity registered as new is simply forgotten, so creating and
    /// deleting it in the same unit of work has no effect on the store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the unit of work is finished.
    pub fn register_removed(&self, entity: impl Into<EntityRef>) -> CoreResult<()> {
        let entity = entity.into();
        let key = entity.key();
        let mut state = self.state.write();
        state.ensure_open()?;

        match state.registry.tracking_of(&key) {
            Some(Tracking::Removed) => return Ok(()),
            Some(Tracking::New) => {
                state.registry.untrack(&key);
                state.operations.retain(|op| !op.targets(&key));
                self.trace_registration("new-withdrawn", &key);
                return Ok(());
            }
            Some(Tracking::Dirty) => {
                state.operations.retain(|op| !op.targets(&key));
            }
            Some(Tracking::Clean) | None => {}
        }

        state.registry.track(Tracking::Removed, key, entity.clone());
        state.operations.push(Operation::Delete(entity));
        self.trace_registration("removed", &key);
        Ok(())
    }

    /// Takes a baseline snapshot of a loaded entity.
    ///
    /// Creates no operation. Does nothing when dirty checking is disabled
    /// or the entity is already tracked.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the unit of work is finished
    /// - [`CoreError::FieldExtraction`] if the entity cannot be captured
    pub fn register_clean(&self, entity: impl Into<EntityRef>) -> CoreResult<()> {
        if !self.config.enable_dirty_check {
            return Ok(());
        }
        let entity = entity.into();
        let key = entity.key();
        let mut state = self.state.write();
        state.ensure_open()?;

        if state.registry.tracking_of(&key).is_some() {
            return Ok(());
        }

        state.snapshots.take_snapshot(&entity)?;
        state.registry.track(Tracking::Clean, key, entity);
        self.trace_registration("clean", &key);
        Ok(())
    }

    // ---- dependencies -------------------------------------------------

    /// Declares that `D` rows depend on `P` rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the unit of work is finished.
    pub fn register_dependency<D: Entity, P: Entity>(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        state.ensure_open()?;
        state
            .dependencies
            .register_dependency(EntityType::of::<D>(), EntityType::of::<P>());
        Ok(())
    }

    /// Sets the ordering weight of `E`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the unit of work is finished.
    pub fn register_entity_weight<E: Entity>(&self, weight: i32) -> CoreResult<()> {
        let mut state = self.state.write();
        state.ensure_open()?;
        state
            .dependencies
            .register_entity_weight(EntityType::of::<E>(), weight);
        Ok(())
    }

    /// Runs `f` with exclusive access to the dependency graph.
    pub fn with_dependencies<R>(&self, f: impl FnOnce(&mut DependencyManager) -> R) -> R {
        f(&mut self.state.write().dependencies)
    }

    // ---- inspection ---------------------------------------------------

    /// Returns true if `entity` changed since its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FieldExtraction`] if the entity cannot be diffed.
    pub fn is_dirty(&self, entity: impl Into<EntityRef>) -> CoreResult<bool> {
        let entity = entity.into();
        self.state.read().snapshots.is_dirty(&entity)
    }

    /// Returns the fields of `entity` that changed since its snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FieldExtraction`] if the entity cannot be diffed.
    pub fn changed_fields(&self, entity: impl Into<EntityRef>) -> CoreResult<ChangeSet> {
        let entity = entity.into();
        self.state.read().snapshots.changed_fields(&entity)
    }

    /// Returns current counts.
    #[must_use]
    pub fn stats(&self) -> UnitOfWorkStats {
        let state = self.state.read();
        Self::stats_of(&state)
    }

    fn stats_of(state: &WorkState) -> UnitOfWorkStats {
        UnitOfWorkStats {
            new_entities: state.registry.count(Tracking::New),
            dirty_entities: state.registry.count(Tracking::Dirty),
            removed_entities: state.registry.count(Tracking::Removed),
            clean_entities: state.registry.count(Tracking::Clean),
            snapshots: state.snapshots.len(),
            total_operations: state.operations.len(),
            is_committed: state.status == WorkStatus::Committed,
            is_rolled_back: state.status == WorkStatus::RolledBack,
        }
    }

    // ---- lifecycle ----------------------------------------------------

    /// Commits all pending work.
    ///
    /// # Errors
    ///
    /// See [`commit_with`](Self::commit_with).
    pub fn commit(&self) -> CoreResult<()> {
        self.commit_with(&CancelToken::new())
    }

    /// Commits all pending work, honouring `token` until the store
    /// transaction commits.
    ///
    /// On success the unit of work becomes committed. On failure nothing is
    /// written, the ids, revisions and timestamps of every scheduled entity
    /// are put back, and the unit of work becomes rolled back. Either way
    /// all tracked state is cleared.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidState`] if the unit of work is finished
    /// - [`CoreError::CircularDependency`] if operations cannot be ordered;
    ///   no store transaction is opened in that case
    /// - [`CoreError::OperationFailed`] wrapping the first failing operation
    /// - [`CoreError::Cancelled`] if `token` fires
    /// - [`CoreError::Store`] if the store cannot begin or commit
    pub fn commit_with(&self, token: &CancelToken) -> CoreResult<()> {
        let mut state = self.state.write();
        state.ensure_open()?;

        let started = Instant::now();
        let stats = Self::stats_of(&state);
        info!(
            uow_id = %self.id,
            new_entities = stats.new_entities,
            dirty_entities = stats.dirty_entities,
            removed_entities = stats.removed_entities,
            total_operations = stats.total_operations,
            "starting unit of work commit"
        );

        let result = {
            let _executing = ExecutingGuard::set(&self.executing);
            self.run_commit(&mut state, token)
        };

        match result {
            Ok(executed) => {
                state.finish(WorkStatus::Committed);
                info!(
                    uow_id = %self.id,
                    executed_operations = executed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "unit of work committed"
                );
                Ok(())
            }
            Err(err) => {
                state.finish(WorkStatus::RolledBack);
                error!(uow_id = %self.id, error = %err, "unit of work commit failed");
                Err(err)
            }
        }
    }

    /// Discards all pending work without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if the unit of work is finished.
    pub fn rollback(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        state.ensure_open()?;
        let discarded = state.operations.len();
        state.finish(WorkStatus::RolledBack);
        info!(uow_id = %self.id, discarded_operations = discarded, "unit of work rolled back");
        Ok(())
    }

    fn run_commit(&self, state: &mut WorkState, token: &CancelToken) -> CoreResult<usize> {
        if self.config.enable_dirty_check {
            self.sweep_snapshots(state)?;
        }

        let mut operations = std::mem::take(&mut state.operations);
        if self.config.enable_operation_merge {
            let before = operations.len();
            operations = optimize::optimize(operations);
            self.trace(|| debug!(uow_id = %self.id, before, after = operations.len(), "operations optimized"));
        }
        let operations = schedule::schedule(operations, &state.dependencies)?;

        if operations.is_empty() {
            debug!(uow_id = %self.id, "nothing to commit");
            return Ok(0);
        }

        let checkpoint = Checkpoint::capture(&operations);
        let result = self.execute(&operations, token);
        if result.is_err() {
            let restored = checkpoint.len();
            checkpoint.restore();
            self.trace(|| debug!(uow_id = %self.id, restored, "entity state restored"));
        }
        result
    }

    /// Runs scheduled operations inside one store transaction.
    fn execute(&self, operations: &[Operation], token: &CancelToken) -> CoreResult<usize> {
        let mut tx = self.store.begin(token)?;
        let batch_size = self.config.effective_batch_size();

        for (index, op) in operations.iter().enumerate() {
            if token.is_cancelled() {
                self.discard(tx);
                return Err(CoreError::Cancelled);
            }

            self.trace(|| {
                debug!(
                    uow_id = %self.id,
                    operation_index = index,
                    operation_kind = %op.kind(),
                    entity_type = %op.entity_type(),
                    entities = op.entities().len(),
                    "executing operation"
                );
            });

            if let Err(source) = op.execute(tx.as_mut(), batch_size) {
                self.discard(tx);
                return Err(CoreError::OperationFailed {
                    index,
                    kind: op.kind(),
                    entity_type: op.entity_type().to_string(),
                    entity_id: op.entity().id(),
                    source: Box::new(source),
                });
            }
        }

        tx.commit()?;
        Ok(operations.len())
    }

    /// Registers clean entities that changed since their snapshot as dirty.
    fn sweep_snapshots(&self, state: &mut WorkState) -> CoreResult<()> {
        let keys: Vec<EntityKey> = state.snapshots.keys().copied().collect();
        for key in keys {
            let Some(entity) = state.registry.get(Tracking::Clean, &key).cloned() else {
                continue;
            };
            let Some(snapshot) = state.snapshots.get(&key) else {
                continue;
            };

            let current = entity.read().field_values()?;
            if entity.key() == key && !snapshot.differs_from(&current) {
                continue;
            }
            let changes = snapshot.changes_to(&current);

            self.trace(|| debug!(uow_id = %self.id, entity = %key, changed_fields = changes.len(), "detected dirty entity"));
            state.registry.track(Tracking::Dirty, key, entity.clone());
            state.operations.push(Operation::update(entity, changes));
        }
        Ok(())
    }

    fn discard(&self, tx: Box<dyn StoreTransaction + '_>) {
        if let Err(err) = tx.rollback() {
            warn!(uow_id = %self.id, error = %err, "store rollback failed");
        }
    }

    fn trace(&self, event: impl FnOnce()) {
        if self.config.enable_detail_log {
            event();
        }
    }

    fn trace_registration(&self, action: &'static str, key: &EntityKey) {
        self.trace(|| debug!(uow_id = %self.id, entity = %key, action, "entity registered"));
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("executing", &self.is_executing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::shared;
    use crate::test_support::{handle, Account, Customer, Invoice, Widget};
    use serde_json::json;
    use unitwork_store::{MemoryStore, Row};

    fn setup(config: Config) -> (Arc<MemoryStore>, UnitOfWork) {
        let store = Arc::new(MemoryStore::new());
        let uow = UnitOfWork::new(store.clone(), config);
        (store, uow)
    }

    #[test]
    fn new_entity_is_inserted() {
        let (store, uow) = setup(Config::default());
        let widget = shared(Widget::new(0, "A"));
        uow.register_new(&widget).unwrap();
        uow.commit().unwrap();

        let id = widget.read().id;
        assert_ne!(id, 0);
        assert_eq!(store.get("widgets", id).unwrap().get("name"), Some(&json!("A")));
        assert!(uow.is_committed());
    }

    #[test]
    fn register_new_twice_is_noop() {
        let (_, uow) = setup(Config::default());
        let widget = shared(Widget::new(0, "A"));
        uow.register_new(&widget).unwrap();
        uow.register_new(&widget).unwrap();
        assert_eq!(uow.stats().total_operations, 1);
    }

    #[test]
    fn new_after_dirty_or_removed_is_rejected() {
        let (_, uow) = setup(Config::new().dirty_check(false));
        let dirty = shared(Widget::new(1, "d"));
        let removed = shared(Widget::new(2, "r"));
        uow.register_dirty(&dirty).unwrap();
        uow.register_removed(&removed).unwrap();

        assert!(matches!(uow.register_new(&dirty), Err(CoreError::InvalidState { .. })));
        assert!(matches!(uow.register_new(&removed), Err(CoreError::InvalidState { .. })));
    }

    #[test]
    fn create_then_remove_has_no_effect() {
        let (store, uow) = setup(Config::default());
        let widget = shared(Widget::new(0, "A"));
        uow.register_new(&widget).unwrap();
        uow.register_removed(&widget).unwrap();

        assert_eq!(uow.stats().total_operations, 0);
        uow.commit().unwrap();
        assert_eq!(store.stats().snapshot().transactions_started, 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let (_, uow) = setup(Config::new().max_entity_count(2));
        uow.register_new(EntityRef::new(Widget::new(0, "a"))).unwrap();
        uow.register_new(EntityRef::new(Widget::new(0, "b"))).unwrap();
        let err = uow.register_new(EntityRef::new(Widget::new(0, "c"))).unwrap_err();
        assert!(matches!(err, CoreError::CapacityExceeded { count: 2, limit: 2 }));
        assert_eq!(uow.stats().new_entities, 2);
    }

    #[test]
    fn dirty_without_change_is_skipped() {
        let (_, uow) = setup(Config::default());
        let widget = shared(Widget::new(1, "a"));
        uow.register_clean(&widget).unwrap();
        uow.register_dirty(&widget).unwrap();
        assert_eq!(uow.stats().dirty_entities, 0);

        widget.write().name = "b".into();
        uow.register_dirty(&widget).unwrap();
        let stats = uow.stats();
        assert_eq!(stats.dirty_entities, 1);
        assert_eq!(stats.clean_entities, 0);
    }

    #[test]
    fn dirty_without_snapshot_is_skipped() {
        let (store, uow) = setup(Config::default());
        let widget = shared(Widget::new(1, "a"));
        uow.register_dirty(&widget).unwrap();

        let stats = uow.stats();
        assert_eq!(stats.dirty_entities, 0);
        assert_eq!(stats.total_operations, 0);
        uow.commit().unwrap();
        assert_eq!(store.stats().snapshot().transactions_started, 0);
    }

    #[test]
    fn dirty_after_id_change_replaces_clean_tracking() {
        let (_, uow) = setup(Config::default());
        let widget = shared(Widget::new(1, "a"));
        uow.register_clean(&widget).unwrap();
        widget.write().id = 5;

        assert!(uow.is_dirty(&widget).unwrap());
        uow.register_dirty(&widget).unwrap();

        let stats = uow.stats();
        assert_eq!(stats.dirty_entities, 1);
        assert_eq!(stats.clean_entities, 0);
        assert_eq!(stats.total_operations, 1);
    }

    #[test]
    fn dirty_without_dirty_check_always_registers() {
        let (_, uow) = setup(Config::new().dirty_check(false));
        let widget = shared(Widget::new(1, "a"));
        uow.register_clean(&widget).unwrap();
        uow.register_dirty(&widget).unwrap();

        let stats = uow.stats();
        assert_eq!(stats.snapshots, 0);
        assert_eq!(stats.dirty_entities, 1);
    }

    #[test]
    fn removed_entity_cannot_become_dirty() {
        let (_, uow) = setup(Config::default());
        let widget = shared(Widget::new(1, "a"));
        uow.register_removed(&widget).unwrap();
        assert!(uow.register_dirty(&widget).is_err());
        uow.register_removed(&widget).unwrap();
        assert_eq!(uow.stats().total_operations, 1);
    }

    #[test]
    fn dirty_then_removed_replaces_update() {
        let (_, uow) = setup(Config::default());
        let widget = shared(Widget::new(1, "a"));
        uow.register_clean(&widget).unwrap();
        widget.write().name = "b".into();
        uow.register_dirty(&widget).unwrap();
        assert_eq!(uow.stats().dirty_entities, 1);
        uow.register_removed(&widget).unwrap();

        let stats = uow.stats();
        assert_eq!(stats.dirty_entities, 0);
        assert_eq!(stats.removed_entities, 1);
        assert_eq!(stats.total_operations, 1);
    }

    #[test]
    fn sweep_persists_mutated_clean_entities() {
        let (store, uow) = setup(Config::default());
        {
            let mut tx = store.begin(&CancelToken::new()).unwrap();
            tx.create("widgets", Row::new(1, [("name".to_string(), json!("a"))].into()))
                .unwrap();
            tx.commit().unwrap();
        }

        let loaded = shared(Widget::new(1, "a"));
        let untouched = shared(Widget::new(2, "b"));
        uow.register_clean(&loaded).unwrap();
        uow.register_clean(&untouched).unwrap();
        loaded.write().name = "changed".into();

        uow.commit().unwrap();
        assert_eq!(store.get("widgets", 1).unwrap().get("name"), Some(&json!("changed")));
        assert!(store.get("widgets", 2).is_none());
    }

    #[test]
    fn dependencies_order_inserts() {
        let (store, uow) = setup(Config::default());
        uow.register_dependency::<Invoice, Customer>().unwrap();

        let invoice = shared(Invoice::new(0));
        let customer = shared(Customer::new(0));
        uow.register_new(&invoice).unwrap();
        uow.register_new(&customer).unwrap();
        uow.commit().unwrap();

        assert_eq!(customer.read().id, 1);
        assert_eq!(invoice.read().id, 1);
        assert_eq!(store.stats().snapshot().transactions_committed, 1);
    }

    #[test]
    fn circular_dependency_fails_without_writes() {
        let (store, uow) = setup(Config::default());
        uow.with_dependencies(|deps| {
            deps.depends_on::<Invoice, Customer>();
            deps.depends_on::<Customer, Invoice>();
        });
        uow.register_new(EntityRef::new(Invoice::new(0))).unwrap();
        uow.register_new(EntityRef::new(Customer::new(0))).unwrap();

        let err = uow.commit().unwrap_err();
        assert!(matches!(err, CoreError::CircularDependency { .. }));
        assert_eq!(store.stats().snapshot().transactions_started, 0);
        assert!(uow.is_rolled_back());
    }

    #[test]
    fn failed_operation_reports_index_and_writes_nothing() {
        let (store, uow) = setup(Config::new().operation_merge(false));
        uow.register_new(EntityRef::new(Account::new("ok"))).unwrap();
        uow.register_new(EntityRef::new(Account::new(""))).unwrap();

        let err = uow.commit().unwrap_err();
        assert_eq!(err.operation_index(), Some(1));
        assert!(matches!(err.root(), CoreError::Validation { .. }));
        assert_eq!(store.count("accounts"), 0);
        assert_eq!(uow.stats(), UnitOfWorkStats { is_rolled_back: true, ..Default::default() });
    }

    #[test]
    fn optimistic_lock_failure_surfaces() {
        let (store, uow) = setup(Config::default());
        {
            let mut tx = store.begin(&CancelToken::new()).unwrap();
            let row = Row::new(1, [("revision".to_string(), json!(2))].into());
            tx.create("accounts", row).unwrap();
            tx.commit().unwrap();
        }

        let account = shared(Account::persisted(1, 1, "ada"));
        uow.register_clean(&account).unwrap();
        account.write().balance = 50;
        uow.register_dirty(&account).unwrap();

        let err = uow.commit().unwrap_err();
        assert!(err.is_optimistic_lock());
        assert_eq!(account.read().base.revision, 1);
    }

    #[test]
    fn failed_commit_restores_entities_for_retry() {
        let (store, uow) = setup(Config::default());
        {
            let mut tx = store.begin(&CancelToken::new()).unwrap();
            let row = Row::new(1, [("revision".to_string(), json!(1))].into());
            tx.create("accounts", row).unwrap();
            tx.commit().unwrap();
        }
        store.reject_writes("customers");

        let account = shared(Account::persisted(1, 1, "ada"));
        let widget = shared(Widget::new(0, "fresh"));
        uow.register_clean(&account).unwrap();
        account.write().balance = 50;
        uow.register_dirty(&account).unwrap();
        uow.register_new(&widget).unwrap();
        uow.register_removed(EntityRef::new(Customer::new(9))).unwrap();

        let err = uow.commit().unwrap_err();
        assert_eq!(err.operation_index(), Some(2));
        assert_eq!(account.read().base.revision, 1);
        assert_eq!(account.read().balance, 50);
        assert!(widget.read().is_new());
        assert_eq!(store.count("widgets"), 0);

        store.allow_writes("customers");
        let retry = UnitOfWork::new(store.clone(), Config::new().dirty_check(false));
        retry.register_dirty(&account).unwrap();
        retry.register_new(&widget).unwrap();
        retry.commit().unwrap();

        assert_eq!(account.read().base.revision, 2);
        assert_eq!(widget.read().id, 1);
        let row = store.get("accounts", 1).unwrap();
        assert_eq!(row.get("balance"), Some(&json!(50)));
    }

    #[test]
    fn second_commit_is_rejected() {
        let (store, uow) = setup(Config::default());
        uow.register_new(EntityRef::new(Widget::new(0, "a"))).unwrap();
        uow.commit().unwrap();

        assert!(matches!(uow.commit(), Err(CoreError::InvalidState { .. })));
        assert!(matches!(uow.rollback(), Err(CoreError::InvalidState { .. })));
        assert!(uow.register_new(EntityRef::new(Widget::new(0, "b"))).is_err());
        assert_eq!(store.count("widgets"), 1);
    }

    #[test]
    fn rollback_discards_without_store_work() {
        let (store, uow) = setup(Config::default());
        uow.register_new(EntityRef::new(Widget::new(0, "a"))).unwrap();
        uow.rollback().unwrap();

        assert!(uow.is_rolled_back());
        assert_eq!(uow.stats().total_operations, 0);
        assert_eq!(store.stats().snapshot().transactions_started, 0);
    }

    #[test]
    fn cancelled_token_aborts_commit() {
        let (store, uow) = setup(Config::default());
        uow.register_new(EntityRef::new(Widget::new(0, "a"))).unwrap();
        let token = CancelToken::new();
        token.cancel();

        assert!(matches!(uow.commit_with(&token), Err(CoreError::Cancelled)));
        assert_eq!(store.count("widgets"), 0);
        assert!(!uow.is_executing());
    }

    #[test]
    fn inspection_reports_changes() {
        let (_, uow) = setup(Config::default());
        let widget = shared(Widget::new(4, "a"));
        uow.register_clean(&widget).unwrap();
        assert!(!uow.is_dirty(&widget).unwrap());

        widget.write().tags.push("x".into());
        assert!(uow.is_dirty(&widget).unwrap());
        assert_eq!(uow.changed_fields(handle(&widget)).unwrap().len(), 1);
    }

    #[test]
    fn merged_inserts_use_one_bulk_statement() {
        let (store, uow) = setup(Config::new().batch_size(100));
        for i in 0..10 {
            uow.register_new(EntityRef::new(Widget::new(0, &format!("w{i}")))).unwrap();
        }
        uow.commit().unwrap();

        assert_eq!(store.count("widgets"), 10);
        assert_eq!(store.stats().snapshot().statements, 1);
    }
}
