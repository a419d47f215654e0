//! Entity state written by operations, restored when a commit fails.

use crate::entity::EntityRef;
use crate::operation::Operation;
use chrono::{DateTime, Utc};

/// Values an operation may overwrite on a live entity.
#[derive(Debug, Clone, Copy)]
struct Saved {
    id: u64,
    revision: Option<u64>,
    stamps: Option<(DateTime<Utc>, DateTime<Utc>)>,
    deleted_at: Option<Option<DateTime<Utc>>>,
}

/// Id, revision and timestamps of every entity of a commit, captured
/// before the first operation runs.
#[derive(Debug, Default)]
pub(crate) struct Checkpoint {
    saved: Vec<(EntityRef, Saved)>,
}

impl Checkpoint {
    pub(crate) fn capture(operations: &[Operation]) -> Self {
        let saved = operations
            .iter()
            .flat_map(Operation::entities)
            .map(|entity| {
                let mut guard = entity.write();
                let saved = Saved {
                    id: guard.id(),
                    revision: guard.as_revisioned_mut().map(|r| r.revision()),
                    stamps: guard
                        .as_timestamped_mut()
                        .map(|ts| (ts.created_at(), ts.updated_at())),
                    deleted_at: guard.as_soft_delete_mut().map(|sd| sd.deleted_at()),
                };
                (entity.clone(), saved)
            })
            .collect();
        Self { saved }
    }

    /// Puts every captured value back.
    pub(crate) fn restore(self) {
        for (entity, saved) in self.saved {
            let mut guard = entity.write();
            guard.set_id(saved.id);
            if let (Some(revision), Some(r)) = (saved.revision, guard.as_revisioned_mut()) {
                r.set_revision(revision);
            }
            if let (Some((created, updated)), Some(ts)) = (saved.stamps, guard.as_timestamped_mut()) {
                ts.set_created_at(created);
                ts.set_updated_at(updated);
            }
            if let (Some(deleted_at), Some(sd)) = (saved.deleted_at, guard.as_soft_delete_mut()) {
                sd.set_deleted_at(deleted_at);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.saved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::shared;
    use crate::snapshot::ChangeSet;
    use crate::test_support::{Account, Widget};

    #[test]
    fn restores_overwritten_values() {
        let account = shared(Account::persisted(3, 4, "ada"));
        let widget = shared(Widget::new(0, "w"));
        let before = account.read().base.clone();

        let checkpoint = Checkpoint::capture(&[
            Operation::update(EntityRef::from(&account), ChangeSet::new()),
            Operation::Insert(EntityRef::from(&widget)),
        ]);
        assert_eq!(checkpoint.len(), 2);

        {
            let mut account = account.write();
            account.base.revision = 5;
            account.base.updated_at = Utc::now();
            account.base.deleted_at = Some(Utc::now());
            account.balance = 10;
        }
        widget.write().id = 7;

        checkpoint.restore();
        let account = account.read();
        assert_eq!(account.base.revision, before.revision);
        assert_eq!(account.base.updated_at, before.updated_at);
        assert_eq!(account.base.deleted_at, None);
        assert_eq!(account.balance, 10);
        assert_eq!(widget.read().id, 0);
    }
}
