//! Operation cancellation and merging.

use crate::entity::{EntityKey, EntityType};
use crate::operation::{Operation, OperationKind, Phase};
use std::collections::HashMap;

/// Drops insert/delete pairs on the same entity, then merges what is left
/// by entity type and phase.
///
/// Merged operations take the position of the first operation of their
/// group.
pub(crate) fn optimize(operations: Vec<Operation>) -> Vec<Operation> {
    let cancelled = cancelled_pairs(&operations);
    let survivors = operations
        .into_iter()
        .zip(cancelled)
        .filter_map(|(op, cancelled)| (!cancelled).then_some(op));
    merge_groups(survivors)
}

/// Marks each delete that follows an insert of the same entity, together
/// with that insert. A delete that comes first is kept.
fn cancelled_pairs(operations: &[Operation]) -> Vec<bool> {
    let mut cancelled = vec![false; operations.len()];
    let mut open_inserts: HashMap<EntityKey, Vec<usize>> = HashMap::new();

    for (index, op) in operations.iter().enumerate() {
        match op.kind() {
            OperationKind::Insert => open_inserts.entry(op.entity().key()).or_default().push(index),
            OperationKind::Delete => {
                if let Some(insert) = open_inserts.get_mut(&op.entity().key()).and_then(Vec::pop) {
                    cancelled[insert] = true;
                    cancelled[index] = true;
                }
            }
            _ => {}
        }
    }

    cancelled
}

fn merge_groups(operations: impl Iterator<Item = Operation>) -> Vec<Operation> {
    let mut slots: Vec<Option<Operation>> = Vec::new();
    let mut groups: HashMap<(EntityType, Phase), usize> = HashMap::new();

    for op in operations {
        let group = (op.entity_type(), op.kind().phase());
        let Some(&slot) = groups.get(&group) else {
            groups.insert(group, slots.len());
            slots.push(Some(op));
            continue;
        };

        let merged = match slots[slot].take() {
            Some(existing) => match existing.merge(op) {
                Ok(merged) => merged,
                Err((existing, op)) => {
                    slots.push(Some(op));
                    existing
                }
            },
            None => op,
        };
        slots[slot] = Some(merged);
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::snapshot::ChangeSet;
    use crate::test_support::{Customer, Widget};

    fn widget(id: u64) -> EntityRef {
        EntityRef::new(Widget::new(id, "w"))
    }

    #[test]
    fn insert_delete_pair_cancels() {
        let a = widget(1);
        let ops = vec![
            Operation::Insert(a.clone()),
            Operation::Insert(widget(2)),
            Operation::Delete(a),
        ];
        let optimized = optimize(ops);
        assert_eq!(optimized.len(), 1);
        assert_eq!(optimized[0].entity().id(), 2);
    }

    #[test]
    fn delete_before_insert_is_kept() {
        let a = widget(1);
        let ops = vec![Operation::Delete(a.clone()), Operation::Insert(a)];
        let kinds: Vec<OperationKind> = optimize(ops).iter().map(Operation::kind).collect();
        assert_eq!(kinds, vec![OperationKind::Delete, OperationKind::Insert]);
    }

    #[test]
    fn merges_by_type_and_phase() {
        let ops = vec![
            Operation::Insert(widget(1)),
            Operation::Insert(EntityRef::new(Customer::new(1))),
            Operation::Insert(widget(2)),
            Operation::update(widget(3), ChangeSet::new()),
            Operation::Delete(widget(4)),
            Operation::Delete(widget(5)),
        ];

        let kinds: Vec<(OperationKind, usize)> = optimize(ops)
            .iter()
            .map(|op| (op.kind(), op.entities().len()))
            .collect();

        assert_eq!(
            kinds,
            vec![
                (OperationKind::BulkInsert, 2),
                (OperationKind::Insert, 1),
                (OperationKind::Update, 1),
                (OperationKind::BulkDelete, 2),
            ]
        );
    }

    #[test]
    fn unmatched_deletes_survive() {
        let ops = vec![Operation::Delete(widget(1)), Operation::Delete(widget(1))];
        let optimized = optimize(ops);
        assert_eq!(optimized.len(), 1);
        assert_eq!(optimized[0].entities().len(), 2);
    }
}
