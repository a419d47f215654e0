//! Host hook integration: a toy repository that defers its writes.

use std::sync::Arc;
use unitwork_core::entity::{shared, EntityRef, FieldSource, Shared};
use unitwork_core::{
    AutoUnitOfWork, Config, CoreResult, HookConfig, HookOutcome, HostHooks, ScopeId,
    TransactionBoundary, WriteKind,
};
use unitwork_store::{CancelToken, RelationalStore, Row};
use unitwork_testkit::{shop_dependencies, AuditLog, Order, TestStore, User};

/// A repository that writes straight to the store unless the hooks defer.
struct Repository<'a> {
    store: &'a TestStore,
    hooks: &'a dyn HostHooks,
}

impl Repository<'_> {
    fn insert(&self, scope: ScopeId, entity: &EntityRef) -> CoreResult<HookOutcome> {
        let outcome = self
            .hooks
            .before_write(scope, WriteKind::Create, std::slice::from_ref(entity))?;
        if outcome == HookOutcome::Proceed {
            let (table, row) = {
                let guard = entity.read();
                (guard.table_name().to_string(), Row::new(0, guard.field_values()?))
            };
            let mut tx = self.store.begin(&CancelToken::new())?;
            let id = tx.create(&table, row)?;
            tx.commit()?;
            entity.write().set_id(id);
        }
        Ok(outcome)
    }

    fn load_user(&self, scope: ScopeId, id: u64) -> CoreResult<Shared<User>> {
        let row = self.store.get("users", id).expect("user should exist");
        let mut user = User::new(
            row.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
            row.get("email").and_then(|v| v.as_str()).unwrap_or_default(),
        );
        user.base.id = id;
        let user = shared(user);
        self.hooks.after_read(scope, &[EntityRef::from(&user)])?;
        Ok(user)
    }
}

fn router(store: &TestStore, hook_config: HookConfig) -> AutoUnitOfWork {
    AutoUnitOfWork::new(store.handle(), Config::default(), hook_config)
        .with_dependencies(shop_dependencies())
}

#[test]
fn writes_outside_a_transaction_go_straight_to_the_store() {
    let store = TestStore::new();
    let hooks = router(&store, HookConfig::default());
    let repo = Repository { store: &store, hooks: &hooks };

    let log = EntityRef::new(AuditLog::new("direct"));
    let outcome = repo.insert(ScopeId::next(), &log).unwrap();

    assert_eq!(outcome, HookOutcome::Proceed);
    assert_eq!(store.count("audit_logs"), 1);
}

#[test]
fn writes_inside_a_transaction_commit_in_dependency_order() {
    let store = TestStore::new();
    let hooks = router(&store, HookConfig::default());
    let repo = Repository { store: &store, hooks: &hooks };
    let scope = ScopeId::next();

    hooks.on_transaction_boundary(scope, TransactionBoundary::Begin).unwrap();
    let order = EntityRef::new(Order::new(0, 250));
    let user = EntityRef::new(User::new("ada", "ada@example.com"));
    assert_eq!(repo.insert(scope, &order).unwrap(), HookOutcome::Registered(1));
    assert_eq!(repo.insert(scope, &user).unwrap(), HookOutcome::Registered(1));
    assert_eq!(store.count("users"), 0);

    hooks.on_transaction_boundary(scope, TransactionBoundary::Commit).unwrap();
    assert_eq!(store.count("users"), 1);
    assert_eq!(store.count("orders"), 1);
    assert_ne!(order.id(), 0);
    assert!(hooks.current(scope).is_none());
}

#[test]
fn loaded_entities_are_snapshotted_and_swept() {
    let store = TestStore::new();
    let seeded = store.seed_user("ada");
    let id = seeded.read().base.id;

    let hooks = router(&store, HookConfig::default());
    let repo = Repository { store: &store, hooks: &hooks };
    let scope = ScopeId::next();

    hooks.on_transaction_boundary(scope, TransactionBoundary::Begin).unwrap();
    let user = repo.load_user(scope, id).unwrap();
    user.write().name = "grace".into();
    hooks.on_transaction_boundary(scope, TransactionBoundary::Commit).unwrap();

    let row = store.get("users", id).unwrap();
    assert_eq!(row.get("name"), Some(&serde_json::json!("grace")));
}

#[test]
fn excluded_tables_bypass_the_unit_of_work() {
    let store = TestStore::new();
    let hooks = router(&store, HookConfig::new().exclude_table("audit_logs"));
    let repo = Repository { store: &store, hooks: &hooks };
    let scope = ScopeId::next();

    hooks.on_transaction_boundary(scope, TransactionBoundary::Begin).unwrap();
    repo.insert(scope, &EntityRef::new(AuditLog::new("bypass"))).unwrap();
    assert_eq!(store.count("audit_logs"), 1);

    hooks.on_transaction_boundary(scope, TransactionBoundary::Rollback).unwrap();
    assert_eq!(store.count("audit_logs"), 1);
}

#[test]
fn rollback_boundary_discards_deferred_writes() {
    let store = TestStore::new();
    let hooks = Arc::new(router(&store, HookConfig::default()));
    let scope = ScopeId::next();

    hooks.on_transaction_boundary(scope, TransactionBoundary::Begin).unwrap();
    hooks
        .before_write(scope, WriteKind::Create, &[EntityRef::new(AuditLog::new("gone"))])
        .unwrap();
    hooks.on_transaction_boundary(scope, TransactionBoundary::Rollback).unwrap();

    assert_eq!(store.count("audit_logs"), 0);
    assert_eq!(hooks.active_scopes(), 0);
}

#[test]
fn scopes_are_independent() {
    let store = TestStore::new();
    let hooks = router(&store, HookConfig::default());
    let (a, b) = (ScopeId::next(), ScopeId::next());

    hooks.bind(a).unwrap();
    hooks.bind(b).unwrap();
    hooks
        .before_write(a, WriteKind::Create, &[EntityRef::new(AuditLog::new("a"))])
        .unwrap();
    hooks
        .before_write(b, WriteKind::Create, &[EntityRef::new(AuditLog::new("b"))])
        .unwrap();

    hooks.on_transaction_boundary(b, TransactionBoundary::Rollback).unwrap();
    hooks.on_transaction_boundary(a, TransactionBoundary::Commit).unwrap();

    let messages: Vec<_> = store
        .rows("audit_logs")
        .into_iter()
        .filter_map(|row| row.get("message").cloned())
        .collect();
    assert_eq!(messages, vec![serde_json::json!("a")]);
}
