//! Test entities and store helpers.
//!
//! The entities model a small shop: users place orders, orders contain
//! items. Between them they cover every entity capability.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Once};
use unitwork_core::entity::{
    shared, BaseEntity, Entity, FieldSource, Revisioned, Shared, SoftDelete, Timestamped,
    Validatable, ValidationError,
};
use unitwork_core::{Config, DependencyManager, UnitOfWork, UnitOfWorkManager};
use unitwork_store::{CancelToken, MemoryStore, RelationalStore, Row};

/// Optional profile embedded in a [`User`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Profile {
    /// Free text.
    pub bio: String,
    /// Age in years.
    pub age: u32,
}

/// A user. Timestamped, revisioned, soft deleted and validated.
#[derive(Debug, Clone, Default, Serialize)]
pub struct User {
    /// Shared bookkeeping columns.
    #[serde(flatten)]
    pub base: BaseEntity,
    /// Display name, must not be empty.
    pub name: String,
    /// Email address, must contain `@`.
    pub email: String,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Optional profile.
    pub profile: Option<Profile>,
}

impl User {
    /// Creates an unsaved user.
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for User {
    fn id(&self) -> u64 {
        self.base.id
    }
    fn set_id(&mut self, id: u64) {
        self.base.id = id;
    }
    fn table_name(&self) -> &str {
        "users"
    }
    fn as_timestamped_mut(&mut self) -> Option<&mut dyn Timestamped> {
        Some(&mut self.base)
    }
    fn as_revisioned_mut(&mut self) -> Option<&mut dyn Revisioned> {
        Some(&mut self.base)
    }
    fn as_soft_delete_mut(&mut self) -> Option<&mut dyn SoftDelete> {
        Some(&mut self.base)
    }
    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

impl Validatable for User {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::field("name", "must not be empty"));
        }
        if !self.email.contains('@') {
            return Err(ValidationError::field("email", "must contain '@'"));
        }
        Ok(())
    }
}

/// An order placed by a [`User`]. Timestamped and revisioned, hard deleted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Order {
    /// Shared bookkeeping columns.
    #[serde(flatten)]
    pub base: BaseEntity,
    /// Owning user.
    pub user_id: u64,
    /// Order total in cents.
    pub total_cents: i64,
    /// Lifecycle label.
    pub status: String,
}

impl Order {
    /// Creates an unsaved order for `user_id`.
    pub fn new(user_id: u64, total_cents: i64) -> Self {
        Self {
            user_id,
            total_cents,
            status: "pending".to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Order {
    fn id(&self) -> u64 {
        self.base.id
    }
    fn set_id(&mut self, id: u64) {
        self.base.id = id;
    }
    fn table_name(&self) -> &str {
        "orders"
    }
    fn as_timestamped_mut(&mut self) -> Option<&mut dyn Timestamped> {
        Some(&mut self.base)
    }
    fn as_revisioned_mut(&mut self) -> Option<&mut dyn Revisioned> {
        Some(&mut self.base)
    }
}

/// A line of an [`Order`]. No capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderItem {
    /// Primary key.
    pub id: u64,
    /// Owning order.
    pub order_id: u64,
    /// Product code.
    pub sku: String,
    /// Units ordered.
    pub quantity: u32,
}

impl OrderItem {
    /// Creates an unsaved item.
    pub fn new(order_id: u64, sku: &str, quantity: u32) -> Self {
        Self {
            id: 0,
            order_id,
            sku: sku.to_string(),
            quantity,
        }
    }
}

impl Entity for OrderItem {
    fn id(&self) -> u64 {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn table_name(&self) -> &str {
        "order_items"
    }
}

/// An audit entry with a field that is never persisted or diffed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditLog {
    /// Primary key.
    pub id: u64,
    /// Logged message.
    pub message: String,
    /// In-memory scratch space.
    #[serde(skip)]
    pub scratch: String,
}

impl AuditLog {
    /// Creates an unsaved entry.
    pub fn new(message: &str) -> Self {
        Self {
            id: 0,
            message: message.to_string(),
            scratch: String::new(),
        }
    }
}

impl Entity for AuditLog {
    fn id(&self) -> u64 {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn table_name(&self) -> &str {
        "audit_logs"
    }
}

/// A wallet that implements the revision capability itself, with a custom
/// revision column.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Wallet {
    /// Primary key.
    pub id: u64,
    /// Optimistic lock counter.
    pub version: u64,
    /// Balance in cents.
    pub balance: i64,
    /// When the wallet was last touched; not managed by the unit of work.
    pub touched_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Creates a persisted wallet at `version`.
    pub fn persisted(id: u64, version: u64, balance: i64) -> Self {
        Self {
            id,
            version,
            balance,
            touched_at: None,
        }
    }
}

impl Revisioned for Wallet {
    fn revision(&self) -> u64 {
        self.version
    }
    fn set_revision(&mut self, revision: u64) {
        self.version = revision;
    }
    fn revision_column(&self) -> &str {
        "version"
    }
}

impl Entity for Wallet {
    fn id(&self) -> u64 {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn table_name(&self) -> &str {
        "wallets"
    }
    fn as_revisioned_mut(&mut self) -> Option<&mut dyn Revisioned> {
        Some(self)
    }
}

/// A type-level node for dependency graph tests and benchmarks.
///
/// Each `K` is a distinct entity type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Node<const K: usize> {
    /// Primary key.
    pub id: u64,
}

impl<const K: usize> Node<K> {
    /// Creates a node.
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}

impl<const K: usize> Entity for Node<K> {
    fn id(&self) -> u64 {
        self.id
    }
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn table_name(&self) -> &str {
        "nodes"
    }
}

/// Order depends on User, OrderItem on Order.
pub fn shop_dependencies() -> DependencyManager {
    let mut deps = DependencyManager::new();
    deps.depends_on::<Order, User>();
    deps.depends_on::<OrderItem, Order>();
    deps
}

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A memory store with helpers for creating units of work and seeding rows.
#[derive(Debug, Clone, Default)]
pub struct TestStore {
    store: Arc<MemoryStore>,
}

impl TestStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Returns the shared store handle.
    pub fn handle(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Creates a unit of work with the default configuration.
    pub fn uow(&self) -> UnitOfWork {
        self.uow_with(Config::default())
    }

    /// Creates a unit of work with `config`.
    pub fn uow_with(&self, config: Config) -> UnitOfWork {
        UnitOfWork::new(self.handle(), config)
    }

    /// Creates a unit of work ordered by [`shop_dependencies`].
    pub fn shop_uow(&self) -> UnitOfWork {
        UnitOfWork::with_dependency_graph(self.handle(), Config::default(), shop_dependencies())
    }

    /// Creates a manager ordered by [`shop_dependencies`].
    pub fn manager(&self) -> UnitOfWorkManager {
        let manager = UnitOfWorkManager::new(self.handle(), Config::default());
        manager.register_dependency::<Order, User>();
        manager.register_dependency::<OrderItem, Order>();
        manager
    }

    /// Writes `entity` straight to the store, bypassing any unit of work,
    /// and assigns its id.
    pub fn seed<E: Entity>(&self, entity: &Shared<E>) -> u64 {
        let (table, row) = {
            let entity = entity.read();
            let columns = entity
                .field_values()
                .expect("fixture entities always serialize");
            (entity.table_name().to_string(), Row::new(entity.id(), columns))
        };

        let mut tx = self
            .store
            .begin(&CancelToken::new())
            .expect("Failed to begin seed transaction");
        let id = tx.create(&table, row).expect("Failed to seed row");
        tx.commit().expect("Failed to commit seed transaction");

        entity.write().set_id(id);
        id
    }

    /// Seeds a user and returns its shared handle.
    pub fn seed_user(&self, name: &str) -> Shared<User> {
        let user = shared(User::new(name, &format!("{name}@example.com")));
        self.seed(&user);
        user
    }
}

impl std::ops::Deref for TestStore {
    type Target = MemoryStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs `f` with a fresh store and a unit of work on it.
///
/// # Example
///
/// ```rust
/// use unitwork_core::entity::shared;
/// use unitwork_testkit::{with_uow, AuditLog};
///
/// with_uow(|store, uow| {
///     uow.register_new(&shared(AuditLog::new("started"))).unwrap();
///     uow.commit().unwrap();
///     assert_eq!(store.count("audit_logs"), 1);
/// });
/// ```
pub fn with_uow<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore, &UnitOfWork) -> R,
{
    let store = TestStore::new();
    let uow = store.uow();
    f(&store, &uow)
}

/// Scenario helpers.
pub mod scenarios {
    use super::*;

    /// A store holding `count` users and one order per user.
    pub fn populated_shop(count: usize) -> (TestStore, Vec<Shared<User>>, Vec<Shared<Order>>) {
        let store = TestStore::new();
        let mut users = Vec::with_capacity(count);
        let mut orders = Vec::with_capacity(count);

        for i in 0..count {
            let user = store.seed_user(&format!("user{i}"));
            let order = shared(Order::new(user.read().base.id, 100 * i as i64));
            store.seed(&order);
            users.push(user);
            orders.push(order);
        }

        (store, users, orders)
    }
}
