//! Operation model.
//!
//! An [`Operation`] is one pending mutation. Single-entity operations are
//! created at registration; bulk operations only come from merging
//! single-entity operations of the same type and phase.

mod execute;

use crate::entity::{EntityKey, EntityRef, EntityType};
use crate::snapshot::ChangeSet;
use std::fmt;

/// Kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Insert one entity.
    Insert,
    /// Update one entity.
    Update,
    /// Delete one entity.
    Delete,
    /// Insert several entities of one type.
    BulkInsert,
    /// Update several entities of one type.
    BulkUpdate,
    /// Delete several entities of one type.
    BulkDelete,
}

impl OperationKind {
    /// Returns true for the bulk kinds.
    #[must_use]
    pub const fn is_bulk(self) -> bool {
        matches!(self, Self::BulkInsert | Self::BulkUpdate | Self::BulkDelete)
    }

    /// Returns the execution phase of this kind.
    #[must_use]
    pub const fn phase(self) -> Phase {
        match self {
            Self::Insert | Self::BulkInsert => Phase::Insert,
            Self::Update | Self::BulkUpdate => Phase::Update,
            Self::Delete | Self::BulkDelete => Phase::Delete,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::BulkInsert => "BULK_INSERT",
            Self::BulkUpdate => "BULK_UPDATE",
            Self::BulkDelete => "BULK_DELETE",
        };
        f.write_str(name)
    }
}

/// Execution phase. Commits run all inserts, then updates, then deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Inserts.
    Insert,
    /// Updates.
    Update,
    /// Deletes.
    Delete,
}

/// A non-empty list of entities of one type.
#[derive(Debug, Clone)]
pub struct Batch {
    entity_type: EntityType,
    entities: Vec<EntityRef>,
}

impl Batch {
    /// Starts a batch with its first entity.
    #[must_use]
    pub fn new(first: EntityRef) -> Self {
        Self {
            entity_type: first.entity_type(),
            entities: vec![first],
        }
    }

    /// Builds a batch, returning `None` if `entities` is empty or mixes types.
    #[must_use]
    pub fn from_entities(entities: Vec<EntityRef>) -> Option<Self> {
        let entity_type = entities.first()?.entity_type();
        if entities.iter().any(|e| e.entity_type() != entity_type) {
            return None;
        }
        Some(Self {
            entity_type,
            entities,
        })
    }

    /// Returns the entity type shared by every member.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Returns the members.
    #[must_use]
    pub fn entities(&self) -> &[EntityRef] {
        &self.entities
    }

    /// Returns the first member.
    #[must_use]
    pub fn first(&self) -> &EntityRef {
        &self.entities[0]
    }

    /// Returns the number of members, always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Always false; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    pub(crate) fn entities_mut(&mut self) -> &mut Vec<EntityRef> {
        &mut self.entities
    }

    fn extend(&mut self, other: Batch) {
        self.entities.extend(other.entities);
    }
}

/// A pending mutation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert one entity.
    Insert(EntityRef),
    /// Update one entity.
    Update {
        /// The entity to save.
        entity: EntityRef,
        /// Fields known to have changed, empty when not computed.
        changes: ChangeSet,
    },
    /// Delete one entity.
    Delete(EntityRef),
    /// Insert several entities.
    BulkInsert(Batch),
    /// Update several entities.
    BulkUpdate(Batch),
    /// Delete several entities.
    BulkDelete(Batch),
}

impl Operation {
    /// Creates an update operation.
    #[must_use]
    pub fn update(entity: EntityRef, changes: ChangeSet) -> Self {
        Self::Update { entity, changes }
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Insert(_) => OperationKind::Insert,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete(_) => OperationKind::Delete,
            Self::BulkInsert(_) => OperationKind::BulkInsert,
            Self::BulkUpdate(_) => OperationKind::BulkUpdate,
            Self::BulkDelete(_) => OperationKind::BulkDelete,
        }
    }

    /// Returns the entity type the operation writes.
    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Insert(e) | Self::Update { entity: e, .. } | Self::Delete(e) => e.entity_type(),
            Self::BulkInsert(b) | Self::BulkUpdate(b) | Self::BulkDelete(b) => b.entity_type(),
        }
    }

    /// Returns the target entity, or the first member of a bulk operation.
    #[must_use]
    pub fn entity(&self) -> &EntityRef {
        match self {
            Self::Insert(e) | Self::Update { entity: e, .. } | Self::Delete(e) => e,
            Self::BulkInsert(b) | Self::BulkUpdate(b) | Self::BulkDelete(b) => b.first(),
        }
    }

    /// Returns every target entity.
    #[must_use]
    pub fn entities(&self) -> &[EntityRef] {
        match self {
            Self::Insert(e) | Self::Update { entity: e, .. } | Self::Delete(e) => {
                std::slice::from_ref(e)
            }
            Self::BulkInsert(b) | Self::BulkUpdate(b) | Self::BulkDelete(b) => b.entities(),
        }
    }

    /// Returns the change set of a single update.
    #[must_use]
    pub fn changes(&self) -> Option<&ChangeSet> {
        match self {
            Self::Update { changes, .. } => Some(changes),
            _ => None,
        }
    }

    /// Returns true if this is a single-entity operation on `key`.
    #[must_use]
    pub fn targets(&self, key: &EntityKey) -> bool {
        !self.kind().is_bulk() && self.entity().key() == *key
    }

    /// Returns true if both are single-entity operations of the same kind
    /// on the same entity. Bulk operations never share identity.
    #[must_use]
    pub fn same_identity(&self, other: &Operation) -> bool {
        !self.kind().is_bulk()
            && self.kind() == other.kind()
            && other.targets(&self.entity().key())
    }

    /// Returns true if this insert and `other` delete cancel out, or the
    /// other way round.
    #[must_use]
    pub fn cancels(&self, other: &Operation) -> bool {
        let kinds = (self.kind(), other.kind());
        matches!(
            kinds,
            (OperationKind::Insert, OperationKind::Delete)
                | (OperationKind::Delete, OperationKind::Insert)
        ) && self.entity().key() == other.entity().key()
    }

    /// Returns true if `other` can be merged into this operation.
    #[must_use]
    pub fn can_merge(&self, other: &Operation) -> bool {
        self.entity_type() == other.entity_type() && self.kind().phase() == other.kind().phase()
    }

    /// Merges `other` into this operation, producing a bulk operation.
    ///
    /// # Errors
    ///
    /// Hands both operations back unchanged if they cannot merge.
    pub fn merge(self, other: Operation) -> Result<Operation, (Operation, Operation)> {
        if !self.can_merge(&other) {
            return Err((self, other));
        }
        let phase = self.kind().phase();
        let mut batch = self.into_batch();
        batch.extend(other.into_batch());
        Ok(match phase {
            Phase::Insert => Self::BulkInsert(batch),
            Phase::Update => Self::BulkUpdate(batch),
            Phase::Delete => Self::BulkDelete(batch),
        })
    }

    pub(crate) fn batch_mut(&mut self) -> Option<&mut Batch> {
        match self {
            Self::BulkInsert(b) | Self::BulkUpdate(b) | Self::BulkDelete(b) => Some(b),
            _ => None,
        }
    }

    fn into_batch(self) -> Batch {
        match self {
            Self::Insert(e) | Self::Update { entity: e, .. } | Self::Delete(e) => Batch::new(e),
            Self::BulkInsert(b) | Self::BulkUpdate(b) | Self::BulkDelete(b) => b,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind().is_bulk() {
            write!(f, "{} {} x{}", self.kind(), self.entity_type(), self.entities().len())
        } else {
            write!(f, "{} {}", self.kind(), self.entity().key())
        }
    }
}
