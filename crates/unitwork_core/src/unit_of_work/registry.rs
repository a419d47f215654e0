//! Entity registries.

use crate::entity::{EntityKey, EntityRef, EntityType, Identity};
use std::collections::HashMap;

/// Registry an entity is tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracking {
    New,
    Dirty,
    Removed,
    Clean,
}

#[derive(Debug, Default)]
struct Bucket(HashMap<EntityType, HashMap<Identity, EntityRef>>);

impl Bucket {
    fn contains(&self, key: &EntityKey) -> bool {
        self.get(key).is_some()
    }

    fn get(&self, key: &EntityKey) -> Option<&EntityRef> {
        self.0.get(&key.entity_type)?.get(&key.identity)
    }

    fn insert(&mut self, key: EntityKey, entity: EntityRef) {
        self.0
            .entry(key.entity_type)
            .or_default()
            .insert(key.identity, entity);
    }

    fn remove(&mut self, key: &EntityKey) -> Option<EntityRef> {
        let by_id = self.0.get_mut(&key.entity_type)?;
        let removed = by_id.remove(&key.identity);
        if by_id.is_empty() {
            self.0.remove(&key.entity_type);
        }
        removed
    }

    fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// The New, Dirty, Removed and Clean registries of one unit of work.
///
/// An entity key is in at most one registry at a time.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    new: Bucket,
    dirty: Bucket,
    removed: Bucket,
    clean: Bucket,
}

impl Registry {
    fn bucket(&self, tracking: Tracking) -> &Bucket {
        match tracking {
            Tracking::New => &self.new,
            Tracking::Dirty => &self.dirty,
            Tracking::Removed => &self.removed,
            Tracking::Clean => &self.clean,
        }
    }

    fn bucket_mut(&mut self, tracking: Tracking) -> &mut Bucket {
        match tracking {
            Tracking::New => &mut self.new,
            Tracking::Dirty => &mut self.dirty,
            Tracking::Removed => &mut self.removed,
            Tracking::Clean => &mut self.clean,
        }
    }

    /// Returns where `key` is tracked, searching New, Dirty, Removed, Clean.
    pub(crate) fn tracking_of(&self, key: &EntityKey) -> Option<Tracking> {
        [
            Tracking::New,
            Tracking::Dirty,
            Tracking::Removed,
            Tracking::Clean,
        ]
        .into_iter()
        .find(|tracking| self.bucket(*tracking).contains(key))
    }

    pub(crate) fn get(&self, tracking: Tracking, key: &EntityKey) -> Option<&EntityRef> {
        self.bucket(tracking).get(key)
    }

    /// Moves `entity` into `tracking`, removing it from any other registry.
    pub(crate) fn track(&mut self, tracking: Tracking, key: EntityKey, entity: EntityRef) {
        self.untrack(&key);
        self.bucket_mut(tracking).insert(key, entity);
    }

    /// Removes `key` from every registry, returning where it was.
    pub(crate) fn untrack(&mut self, key: &EntityKey) -> Option<Tracking> {
        let tracking = self.tracking_of(key)?;
        self.bucket_mut(tracking).remove(key);
        Some(tracking)
    }

    pub(crate) fn count(&self, tracking: Tracking) -> usize {
        self.bucket(tracking).len()
    }

    /// Entities counted against the capacity ceiling.
    pub(crate) fn pending(&self) -> usize {
        self.new.len() + self.dirty.len() + self.removed.len()
    }

    pub(crate) fn clear(&mut self) {
        self.new.clear();
        self.dirty.clear();
        self.removed.clear();
        self.clean.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Widget;

    #[test]
    fn track_moves_between_registries() {
        let mut registry = Registry::default();
        let widget = EntityRef::new(Widget::new(1, "w"));
        let key = widget.key();

        registry.track(Tracking::Clean, key, widget.clone());
        assert_eq!(registry.tracking_of(&key), Some(Tracking::Clean));
        assert_eq!(registry.pending(), 0);

        registry.track(Tracking::Dirty, key, widget);
        assert_eq!(registry.tracking_of(&key), Some(Tracking::Dirty));
        assert_eq!(registry.count(Tracking::Clean), 0);
        assert_eq!(registry.pending(), 1);
    }

    #[test]
    fn untrack_reports_origin() {
        let mut registry = Registry::default();
        let widget = EntityRef::new(Widget::new(0, "w"));
        let key = widget.key();
        registry.track(Tracking::New, key, widget);

        assert_eq!(registry.untrack(&key), Some(Tracking::New));
        assert_eq!(registry.untrack(&key), None);
        assert_eq!(registry.count(Tracking::New), 0);
    }
}
