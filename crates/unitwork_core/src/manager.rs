//! Unit of work factory.

use crate::config::Config;
use crate::dependency::DependencyManager;
use crate::entity::{Entity, EntityType};
use crate::error::CoreResult;
use crate::unit_of_work::UnitOfWork;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;
use unitwork_store::{CancelToken, RelationalStore};

/// Creates units of work that share a store, a configuration and a
/// dependency graph.
///
/// Each unit of work gets its own copy of the graph, so later changes on the
/// manager do not affect units already begun.
pub struct UnitOfWorkManager {
    store: Arc<dyn RelationalStore>,
    config: Config,
    dependencies: RwLock<DependencyManager>,
}

impl UnitOfWorkManager {
    /// Creates a manager.
    pub fn new(store: Arc<dyn RelationalStore>, config: Config) -> Self {
        Self {
            store,
            config,
            dependencies: RwLock::new(DependencyManager::new()),
        }
    }

    /// Returns the configuration given to new units of work.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Declares that `D` rows depend on `P` rows for every future unit of work.
    pub fn register_dependency<D: Entity, P: Entity>(&self) -> bool {
        self.dependencies
            .write()
            .register_dependency(EntityType::of::<D>(), EntityType::of::<P>())
    }

    /// Sets the ordering weight of `E` for every future unit of work.
    pub fn register_entity_weight<E: Entity>(&self, weight: i32) {
        self.dependencies
            .write()
            .register_entity_weight(EntityType::of::<E>(), weight);
    }

    /// Returns a copy of the shared dependency graph.
    #[must_use]
    pub fn dependencies(&self) -> DependencyManager {
        self.dependencies.read().clone()
    }

    /// Begins a new unit of work.
    #[must_use]
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::with_dependency_graph(
            Arc::clone(&self.store),
            self.config.clone(),
            self.dependencies(),
        )
    }

    /// Runs `f` inside a fresh unit of work.
    ///
    /// # Errors
    ///
    /// See [`execute_with`](Self::execute_with).
    pub fn execute<T>(&self, f: impl FnOnce(&UnitOfWork) -> CoreResult<T>) -> CoreResult<T> {
        self.execute_with(&CancelToken::new(), f)
    }

    /// Runs `f` inside a fresh unit of work and commits it with `token`.
    ///
    /// If `f` fails the unit of work is rolled back and the closure's error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the commit error.
    pub fn execute_with<T>(
        &self,
        token: &CancelToken,
        f: impl FnOnce(&UnitOfWork) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let uow = self.begin();
        match f(&uow) {
            Ok(value) => {
                uow.commit_with(token)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = rollback_if_open(&uow) {
                    warn!(uow_id = %uow.id(), error = %rollback_err, "rollback after failed closure failed");
                }
                Err(err)
            }
        }
    }
}

/// The closure may already have finished the unit of work itself.
fn rollback_if_open(uow: &UnitOfWork) -> CoreResult<()> {
    if uow.is_finished() {
        return Ok(());
    }
    uow.rollback()
}

impl std::fmt::Debug for UnitOfWorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWorkManager")
            .field("config", &self.config)
            .field("dependencies", &*self.dependencies.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{shared, EntityRef};
    use crate::error::CoreError;
    use crate::test_support::{Customer, Invoice, Widget};
    use unitwork_store::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, UnitOfWorkManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = UnitOfWorkManager::new(store.clone(), Config::default());
        (store, manager)
    }

    #[test]
    fn execute_commits_on_success() {
        let (store, manager) = manager();
        let widget = shared(Widget::new(0, "a"));

        let id = manager
            .execute(|uow| {
                uow.register_new(&widget)?;
                Ok(7)
            })
            .unwrap();

        assert_eq!(id, 7);
        assert_eq!(store.count("widgets"), 1);
    }

    #[test]
    fn execute_rolls_back_on_error() {
        let (store, manager) = manager();
        let err = manager
            .execute(|uow| -> CoreResult<()> {
                uow.register_new(EntityRef::new(Widget::new(0, "a")))?;
                Err(CoreError::invalid_state("abort"))
            })
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert_eq!(store.count("widgets"), 0);
        assert_eq!(store.stats().snapshot().transactions_started, 0);
    }

    #[test]
    fn units_inherit_dependencies() {
        let (_, manager) = manager();
        assert!(manager.register_dependency::<Invoice, Customer>());

        let uow = manager.begin();
        let inherited = uow.with_dependencies(|deps| {
            deps.has_dependency(EntityType::of::<Invoice>(), EntityType::of::<Customer>())
        });
        assert!(inherited);

        uow.with_dependencies(DependencyManager::clear);
        assert_eq!(manager.dependencies().entity_types().len(), 2);
    }

    #[test]
    fn cancelled_execute_surfaces_cancellation() {
        let (store, manager) = manager();
        let token = CancelToken::new();
        token.cancel();

        let err = manager
            .execute_with(&token, |uow| {
                uow.register_new(EntityRef::new(Widget::new(0, "a")))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(store.count("widgets"), 0);
    }
}
