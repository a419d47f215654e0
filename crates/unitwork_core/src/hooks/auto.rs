//! Automatic unit of work management per host scope.

use super::{HookOutcome, HostHooks, ScopeId, TransactionBoundary, WriteKind};
use crate::config::Config;
use crate::dependency::DependencyManager;
use crate::entity::EntityRef;
use crate::error::{CoreError, CoreResult};
use crate::unit_of_work::UnitOfWork;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use unitwork_store::RelationalStore;

/// Hook behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    /// Defer writes into the bound unit of work.
    pub enabled: bool,
    /// Snapshot persisted entities returned by reads.
    pub auto_snapshot: bool,
    /// Tables whose writes and reads are never intercepted.
    pub excluded_tables: BTreeSet<String>,
    /// Log every intercepted call at debug level.
    pub verbose_log: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_snapshot: true,
            excluded_tables: BTreeSet::new(),
            verbose_log: false,
        }
    }
}

impl HookConfig {
    /// Creates the default hook configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables interception.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enables or disables snapshots after reads.
    #[must_use]
    pub fn auto_snapshot(mut self, enabled: bool) -> Self {
        self.auto_snapshot = enabled;
        self
    }

    /// Excludes a table from interception.
    #[must_use]
    pub fn exclude_table(mut self, table: impl Into<String>) -> Self {
        self.excluded_tables.insert(table.into());
        self
    }

    /// Enables or disables per-call logging.
    #[must_use]
    pub fn verbose_log(mut self, enabled: bool) -> Self {
        self.verbose_log = enabled;
        self
    }

    fn is_excluded(&self, table: &str) -> bool {
        self.excluded_tables.contains(table)
    }
}

/// Binds a unit of work to each host scope and routes hook calls to it.
///
/// `Begin` creates and binds a unit of work, `Commit` and `Rollback` unbind
/// and finish it. Writes in a bound scope are registered instead of being
/// performed; writes in an unbound scope proceed.
pub struct AutoUnitOfWork {
    store: Arc<dyn RelationalStore>,
    config: Config,
    hook_config: HookConfig,
    dependencies: DependencyManager,
    active: RwLock<HashMap<ScopeId, Arc<UnitOfWork>>>,
}

impl AutoUnitOfWork {
    /// Creates a router with no dependency mapping.
    pub fn new(store: Arc<dyn RelationalStore>, config: Config, hook_config: HookConfig) -> Self {
        Self {
            store,
            config,
            hook_config,
            dependencies: DependencyManager::new(),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the dependency graph given to every unit of work this router
    /// creates.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: DependencyManager) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Returns the hook configuration.
    #[must_use]
    pub fn hook_config(&self) -> &HookConfig {
        &self.hook_config
    }

    /// Creates a unit of work and binds it to `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidState`] if `scope` is already bound.
    pub fn bind(&self, scope: ScopeId) -> CoreResult<Arc<UnitOfWork>> {
        let mut active = self.active.write();
        if active.contains_key(&scope) {
            return Err(CoreError::invalid_state(format!(
                "{scope} already has a unit of work"
            )));
        }
        let uow = Arc::new(UnitOfWork::with_dependency_graph(
            Arc::clone(&self.store),
            self.config.clone(),
            self.dependencies.clone(),
        ));
        active.insert(scope, Arc::clone(&uow));
        debug!(%scope, uow_id = %uow.id(), "unit of work bound");
        Ok(uow)
    }

    /// Returns the unit of work bound to `scope`.
    #[must_use]
    pub fn current(&self, scope: ScopeId) -> Option<Arc<UnitOfWork>> {
        self.active.read().get(&scope).cloned()
    }

    /// Unbinds and returns the unit of work of `scope` without finishing it.
    pub fn unbind(&self, scope: ScopeId) -> Option<Arc<UnitOfWork>> {
        self.active.write().remove(&scope)
    }

    /// Returns the number of bound scopes.
    #[must_use]
    pub fn active_scopes(&self) -> usize {
        self.active.read().len()
    }

    fn register(uow: &UnitOfWork, kind: WriteKind, entity: &EntityRef) -> CoreResult<()> {
        let entity = entity.clone();
        match kind {
            WriteKind::Create => uow.register_new(entity),
            WriteKind::Update => uow.register_dirty(entity),
            WriteKind::Delete => uow.register_removed(entity),
        }
    }

    fn excludes(&self, entities: &[EntityRef]) -> bool {
        !self.hook_config.excluded_tables.is_empty()
            && entities
                .iter()
                .any(|e| self.hook_config.is_excluded(&e.table_name()))
    }
}

impl HostHooks for AutoUnitOfWork {
    fn before_write(
        &self,
        scope: ScopeId,
        kind: WriteKind,
        entities: &[EntityRef],
    ) -> CoreResult<HookOutcome> {
        if !self.hook_config.enabled {
            return Ok(HookOutcome::Proceed);
        }
        let Some(uow) = self.current(scope) else {
            return Ok(HookOutcome::Proceed);
        };
        // Writes issued while the unit of work itself is committing.
        if uow.is_executing() || self.excludes(entities) {
            return Ok(HookOutcome::Proceed);
        }

        for entity in entities {
            Self::register(&uow, kind, entity)?;
        }
        if self.hook_config.verbose_log {
            debug!(%scope, uow_id = %uow.id(), ?kind, entities = entities.len(), "write deferred");
        }
        Ok(HookOutcome::Registered(entities.len()))
    }

    fn after_read(&self, scope: ScopeId, entities: &[EntityRef]) -> CoreResult<usize> {
        if !self.hook_config.enabled || !self.hook_config.auto_snapshot {
            return Ok(0);
        }
        let Some(uow) = self.current(scope) else {
            return Ok(0);
        };
        if uow.is_executing() {
            return Ok(0);
        }

        let mut snapshotted = 0;
        for entity in entities {
            if entity.id() == 0 || self.hook_config.is_excluded(&entity.table_name()) {
                continue;
            }
            uow.register_clean(entity.clone())?;
            snapshotted += 1;
        }
        if self.hook_config.verbose_log {
            debug!(%scope, uow_id = %uow.id(), snapshotted, "read snapshotted");
        }
        Ok(snapshotted)
    }

    fn on_transaction_boundary(
        &self,
        scope: ScopeId,
        boundary: TransactionBoundary,
    ) -> CoreResult<()> {
        match boundary {
            TransactionBoundary::Begin => self.bind(scope).map(drop),
            TransactionBoundary::Commit => match self.unbind(scope) {
                Some(uow) => uow.commit(),
                None => Ok(()),
            },
            TransactionBoundary::Rollback => match self.unbind(scope) {
                Some(uow) if !uow.is_finished() => uow.rollback(),
                _ => Ok(()),
            },
        }
    }
}

impl std::fmt::Debug for AutoUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoUnitOfWork")
            .field("hook_config", &self.hook_config)
            .field("active_scopes", &self.active_scopes())
            .finish_non_exhaustive()
    }
}
