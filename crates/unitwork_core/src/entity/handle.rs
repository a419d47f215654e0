//! Shared entity handles and structural keys.

use super::capability::Capabilities;
use super::Entity;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A caller-owned entity that a unit of work can track.
pub type Shared<E> = Arc<RwLock<E>>;

/// Wraps an entity for tracking.
pub fn shared<E: Entity>(entity: E) -> Shared<E> {
    Arc::new(RwLock::new(entity))
}

/// The concrete Rust type of an entity.
///
/// Equality and hashing use the `TypeId`; ordering uses the type name so
/// that sorted output is stable across runs.
#[derive(Debug, Clone, Copy)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    /// Returns the entity type of `E`.
    #[must_use]
    pub fn of<E: Entity>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// Returns the fully qualified type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for EntityType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(other.name).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// How an entity is identified within its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    /// A persisted entity, identified by primary key.
    Persisted(u64),
    /// An entity without a primary key, identified by its handle.
    Transient(usize),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "{id}"),
            Self::Transient(addr) => write!(f, "new@{addr:x}"),
        }
    }
}

/// Registry and snapshot key: entity type plus identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    /// The entity type.
    pub entity_type: EntityType,
    /// The identity within the type.
    pub identity: Identity,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.identity)
    }
}

/// A type-erased handle to a tracked entity.
///
/// Cloning is cheap and every clone refers to the same entity. The entity
/// type and capabilities are resolved once, when the handle is created.
///
/// The unit of work locks the entity while reading or writing it, so
/// callers must not hold a guard on it across unit of work calls.
#[derive(Clone)]
pub struct EntityRef {
    inner: Arc<RwLock<dyn Entity>>,
    entity_type: EntityType,
    capabilities: Capabilities,
}

impl EntityRef {
    /// Wraps an owned entity.
    pub fn new<E: Entity>(entity: E) -> Self {
        Self::from_shared(&shared(entity))
    }

    /// Creates a handle sharing an existing entity.
    pub fn from_shared<E: Entity>(entity: &Shared<E>) -> Self {
        let capabilities = {
            let mut guard = entity.write();
            Capabilities {
                timestamped: guard.as_timestamped_mut().is_some(),
                revisioned: guard.as_revisioned_mut().is_some(),
                soft_delete: guard.as_soft_delete_mut().is_some(),
                validatable: guard.as_validatable().is_some(),
            }
        };
        let inner: Arc<RwLock<dyn Entity>> = entity.clone();

        Self {
            inner,
            entity_type: EntityType::of::<E>(),
            capabilities,
        }
    }

    /// Locks the entity for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, dyn Entity> {
        self.inner.read()
    }

    /// Locks the entity for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, dyn Entity> {
        self.inner.write()
    }

    /// Returns the entity type.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Returns the capabilities resolved at construction.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Returns the current primary key.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.read().id()
    }

    /// Returns the current table name.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.inner.read().table_name().to_string()
    }

    /// Returns the current identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        match self.id() {
            0 => Identity::Transient(self.address()),
            id => Identity::Persisted(id),
        }
    }

    /// Returns the current registry key.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type,
            identity: self.identity(),
        }
    }

    /// Returns true if both handles refer to the same entity.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner).cast::<()>() as usize
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("key", &self.key())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl<E: Entity> From<&Shared<E>> for EntityRef {
    fn from(entity: &Shared<E>) -> Self {
        Self::from_shared(entity)
    }
}

impl From<&EntityRef> for EntityRef {
    fn from(entity: &EntityRef) -> Self {
        entity.clone()
    }
}
