//! Snapshot engine.
//!
//! Captures an entity's field values and later reports whether, and how,
//! the live entity has diverged from that capture. Snapshots are keyed by
//! [`EntityKey`], so two entities of different types never share a slot and
//! re-snapshotting an entity replaces its previous capture. The manager also
//! remembers which handle each snapshot came from, so an entity whose id
//! changed after capture is still matched to its snapshot and reported
//! dirty.

mod change;

pub use change::{ChangeSet, FieldChange, FieldChangeKind};

use crate::entity::{EntityKey, EntityRef, FieldValues};
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// A point-in-time copy of an entity's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    key: EntityKey,
    fields: FieldValues,
    captured_at: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Captures an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's fields cannot be extracted.
    pub fn capture(entity: &EntityRef) -> CoreResult<Self> {
        let fields = entity.read().field_values()?;
        Ok(Self {
            key: entity.key(),
            fields,
            captured_at: Utc::now(),
        })
    }

    /// Returns the key of the captured entity.
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Returns the captured field values.
    #[must_use]
    pub fn fields(&self) -> &FieldValues {
        &self.fields
    }

    /// Returns when the snapshot was taken.
    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns true if `current` differs from the captured values.
    #[must_use]
    pub fn differs_from(&self, current: &FieldValues) -> bool {
        change::differs(&self.fields, current)
    }

    /// Returns the changes from the captured values to `current`.
    #[must_use]
    pub fn changes_to(&self, current: &FieldValues) -> ChangeSet {
        change::diff(&self.fields, current)
    }
}

/// Holds the snapshots of one unit of work.
#[derive(Debug, Default)]
pub struct SnapshotManager {
    snapshots: BTreeMap<EntityKey, EntitySnapshot>,
    /// Captured handles by address, with the key they were captured under.
    origins: HashMap<usize, (EntityKey, EntityRef)>,
}

impl SnapshotManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures `entity`, replacing any earlier snapshot of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's fields cannot be extracted.
    pub fn take_snapshot(&mut self, entity: &EntityRef) -> CoreResult<()> {
        let snapshot = EntitySnapshot::capture(entity)?;
        let key = snapshot.key;
        if let Some((previous, _)) = self.origins.insert(entity.address(), (key, entity.clone())) {
            if previous != key {
                self.snapshots.remove(&previous);
            }
        }
        self.snapshots.insert(key, snapshot);
        Ok(())
    }

    /// Returns the snapshot of `entity`.
    ///
    /// Looks up the snapshot taken from this handle first, then any
    /// snapshot stored under the entity's current key.
    #[must_use]
    pub fn snapshot_of(&self, entity: &EntityRef) -> Option<&EntitySnapshot> {
        self.origins
            .get(&entity.address())
            .and_then(|(key, _)| self.snapshots.get(key))
            .or_else(|| self.snapshots.get(&entity.key()))
    }

    /// Returns true if `entity` changed since its snapshot.
    ///
    /// An entity whose identity no longer matches the snapshot is dirty. An
    /// entity without a snapshot is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's fields cannot be extracted.
    pub fn is_dirty(&self, entity: &EntityRef) -> CoreResult<bool> {
        match self.snapshot_of(entity) {
            Some(snapshot) if *snapshot.key() != entity.key() => Ok(true),
            Some(snapshot) => Ok(snapshot.differs_from(&entity.read().field_values()?)),
            None => Ok(false),
        }
    }

    /// Returns the fields of `entity` that changed since its snapshot.
    ///
    /// Empty if the entity has no snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity's fields cannot be extracted.
    pub fn changed_fields(&self, entity: &EntityRef) -> CoreResult<ChangeSet> {
        match self.snapshot_of(entity) {
            Some(snapshot) => Ok(snapshot.changes_to(&entity.read().field_values()?)),
            None => Ok(ChangeSet::new()),
        }
    }

    /// Returns the snapshot stored under `key`.
    #[must_use]
    pub fn get(&self, key: &EntityKey) -> Option<&EntitySnapshot> {
        self.snapshots.get(key)
    }

    /// Returns true if a snapshot exists for `key`.
    #[must_use]
    pub fn has_snapshot(&self, key: &EntityKey) -> bool {
        self.snapshots.contains_key(key)
    }

    /// Drops the snapshot of `entity`, returning it.
    pub fn remove_snapshot(&mut self, entity: &EntityRef) -> Option<EntitySnapshot> {
        let key = match self.origins.remove(&entity.address()) {
            Some((key, _)) => key,
            None => entity.key(),
        };
        self.snapshots.remove(&key)
    }

    /// Returns the keys of all snapshots in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.snapshots.keys()
    }

    /// Returns the number of snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if there are no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Drops every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.origins.clear();
    }
}
