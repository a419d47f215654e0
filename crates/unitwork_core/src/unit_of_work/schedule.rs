//! Dependency-aware execution order.

use crate::dependency::DependencyManager;
use crate::entity::{EntityRef, EntityType};
use crate::error::CoreResult;
use crate::operation::{Operation, Phase};
use std::collections::HashMap;

/// Orders operations for execution: inserts, then updates, then deletes.
///
/// Inserts follow the insertion order of the dependency graph, deletes the
/// exact reverse of it. Updates keep their arrival order.
///
/// # Errors
///
/// Returns a circular dependency error if the insert or delete types
/// cannot be ordered.
pub(crate) fn schedule(
    operations: Vec<Operation>,
    dependencies: &DependencyManager,
) -> CoreResult<Vec<Operation>> {
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    for op in operations {
        match op.kind().phase() {
            Phase::Insert => inserts.push(op),
            Phase::Update => updates.push(op),
            Phase::Delete => deletes.push(op),
        }
    }

    let inserts = insertion_order(inserts, dependencies)?;
    let mut deletes = insertion_order(deletes, dependencies)?;
    deletes.reverse();
    for op in &mut deletes {
        if let Some(batch) = op.batch_mut() {
            batch.entities_mut().reverse();
        }
    }

    let mut ordered = inserts;
    ordered.extend(updates);
    ordered.extend(deletes);
    Ok(ordered)
}

/// Sorts operations by type rank, then by the stringified id of their
/// first entity. Bulk members are sorted the same way.
fn insertion_order(
    mut operations: Vec<Operation>,
    dependencies: &DependencyManager,
) -> CoreResult<Vec<Operation>> {
    if operations.is_empty() {
        return Ok(operations);
    }

    let types: Vec<EntityType> = operations.iter().map(Operation::entity_type).collect();
    let rank: HashMap<EntityType, usize> = dependencies
        .resolve_type_order(&types)?
        .into_iter()
        .enumerate()
        .map(|(rank, ty)| (ty, rank))
        .collect();

    for op in &mut operations {
        if let Some(batch) = op.batch_mut() {
            batch.entities_mut().sort_by_cached_key(id_key);
        }
    }

    operations.sort_by_cached_key(|op| {
        (
            rank.get(&op.entity_type()).copied().unwrap_or(usize::MAX),
            id_key(op.entity()),
        )
    });
    Ok(operations)
}

fn id_key(entity: &EntityRef) -> String {
    entity.id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::operation::{Batch, OperationKind};
    use crate::snapshot::ChangeSet;
    use crate::test_support::{Customer, Invoice, LineItem};

    fn deps() -> DependencyManager {
        let mut deps = DependencyManager::new();
        deps.depends_on::<Invoice, Customer>();
        deps.depends_on::<LineItem, Invoice>();
        deps
    }

    fn summary(ops: &[Operation]) -> Vec<(OperationKind, String, u64)> {
        ops.iter()
            .map(|op| (op.kind(), op.entity_type().to_string(), op.entity().id()))
            .collect()
    }

    #[test]
    fn phases_run_in_order() {
        let ops = vec![
            Operation::Delete(EntityRef::new(Customer::new(9))),
            Operation::update(EntityRef::new(Invoice::new(5)), ChangeSet::new()),
            Operation::Insert(EntityRef::new(LineItem::new(1))),
            Operation::Insert(EntityRef::new(Customer::new(2))),
            Operation::Delete(EntityRef::new(LineItem::new(7))),
        ];

        let ordered = schedule(ops, &deps()).unwrap();
        assert_eq!(
            summary(&ordered),
            vec![
                (OperationKind::Insert, "Customer".into(), 2),
                (OperationKind::Insert, "LineItem".into(), 1),
                (OperationKind::Update, "Invoice".into(), 5),
                (OperationKind::Delete, "LineItem".into(), 7),
                (OperationKind::Delete, "Customer".into(), 9),
            ]
        );
    }

    #[test]
    fn updates_keep_arrival_order() {
        let ops = vec![
            Operation::update(EntityRef::new(LineItem::new(1)), ChangeSet::new()),
            Operation::update(EntityRef::new(Customer::new(2)), ChangeSet::new()),
        ];
        let ordered = schedule(ops, &deps()).unwrap();
        assert_eq!(ordered[0].entity_type().to_string(), "LineItem");
    }

    #[test]
    fn bulk_deletes_reverse_members() {
        let batch = Batch::from_entities(
            [1, 2, 3]
                .map(|id| EntityRef::new(Customer::new(id)))
                .to_vec(),
        )
        .unwrap();
        let ordered = schedule(vec![Operation::BulkDelete(batch)], &deps()).unwrap();
        let ids: Vec<u64> = ordered[0].entities().iter().map(EntityRef::id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn cycle_fails_before_anything_runs() {
        let mut deps = deps();
        deps.depends_on::<Customer, LineItem>();
        let ops = vec![
            Operation::Insert(EntityRef::new(Customer::new(0))),
            Operation::Insert(EntityRef::new(Invoice::new(0))),
            Operation::Insert(EntityRef::new(LineItem::new(0))),
        ];
        let err = schedule(ops, &deps).unwrap_err();
        assert!(matches!(err, CoreError::CircularDependency { .. }));
    }
}
