//! Operation execution against a store transaction.

use super::Operation;
use crate::entity::{Entity, EntityRef};
use crate::error::{CoreError, CoreResult};
use chrono::Utc;
use unitwork_store::{Predicate, Row, StoreTransaction, PRIMARY_KEY};

impl Operation {
    /// Applies the operation inside `tx`.
    ///
    /// Inserts write the assigned primary key back into the entity.
    /// Revisioned updates advance the entity's revision, and restore it if
    /// the update fails.
    ///
    /// # Errors
    ///
    /// Returns the first validation, optimistic lock or store error.
    pub fn execute(
        &self,
        tx: &mut (dyn StoreTransaction + '_),
        batch_size: usize,
    ) -> CoreResult<()> {
        match self {
            Self::Insert(entity) => insert_one(tx, entity),
            Self::Update { entity, .. } => update_one(tx, entity),
            Self::Delete(entity) => delete_one(tx, entity),
            Self::BulkInsert(batch) => bulk_insert(tx, batch.entities(), batch_size),
            Self::BulkUpdate(batch) => batch
                .entities()
                .iter()
                .try_for_each(|entity| update_one(tx, entity)),
            Self::BulkDelete(batch) => bulk_delete(tx, batch.entities()),
        }
    }
}

fn row_of(entity: &dyn Entity) -> CoreResult<Row> {
    Ok(Row::new(entity.id(), entity.field_values()?))
}

fn validate(entity: &EntityRef) -> CoreResult<()> {
    if !entity.capabilities().validatable {
        return Ok(());
    }
    let label = entity.key().to_string();
    let guard = entity.read();
    match guard.as_validatable() {
        Some(validatable) => validatable
            .validate()
            .map_err(|source| CoreError::Validation {
                entity: label,
                source,
            }),
        None => Ok(()),
    }
}

/// Validates and stamps a pending insert, returning its table and row.
fn prepare_insert(entity: &EntityRef) -> CoreResult<(String, Row)> {
    validate(entity)?;
    let mut guard = entity.write();
    if entity.capabilities().timestamped && guard.is_new() {
        if let Some(ts) = guard.as_timestamped_mut() {
            let now = Utc::now();
            ts.set_created_at(now);
            ts.set_updated_at(now);
        }
    }
    Ok((guard.table_name().to_string(), row_of(&*guard)?))
}

fn insert_one(tx: &mut (dyn StoreTransaction + '_), entity: &EntityRef) -> CoreResult<()> {
    let (table, row) = prepare_insert(entity)?;
    let id = tx.create(&table, row)?;
    entity.write().set_id(id);
    Ok(())
}

fn update_one(tx: &mut (dyn StoreTransaction + '_), entity: &EntityRef) -> CoreResult<()> {
    validate(entity)?;
    let label = entity.key().to_string();
    let capabilities = entity.capabilities();

    let mut guard = entity.write();
    if capabilities.timestamped {
        if let Some(ts) = guard.as_timestamped_mut() {
            ts.set_updated_at(Utc::now());
        }
    }
    let table = guard.table_name().to_string();
    let id = guard.id();

    let lock = if capabilities.revisioned {
        guard.as_revisioned_mut().map(|rev| {
            let original = rev.revision();
            let column = rev.revision_column().to_string();
            rev.set_revision(rev.next_revision());
            (original, column)
        })
    } else {
        None
    };

    let Some((original, column)) = lock else {
        tx.save(&table, row_of(&*guard)?)?;
        return Ok(());
    };

    let predicate = Predicate::new().eq(PRIMARY_KEY, id).eq(column, original);
    let result = row_of(&*guard)
        .and_then(|row| tx.save_where(&table, row, &predicate).map_err(CoreError::from));

    match result {
        Ok(affected) if affected > 0 => Ok(()),
        Ok(_) => {
            restore_revision(&mut *guard, original);
            Err(CoreError::OptimisticLock {
                entity: label,
                revision: original,
            })
        }
        Err(err) => {
            restore_revision(&mut *guard, original);
            Err(err)
        }
    }
}

fn restore_revision(entity: &mut dyn Entity, revision: u64) {
    if let Some(rev) = entity.as_revisioned_mut() {
        rev.set_revision(revision);
    }
}

fn delete_one(tx: &mut (dyn StoreTransaction + '_), entity: &EntityRef) -> CoreResult<()> {
    let capabilities = entity.capabilities();
    let mut guard = entity.write();
    let table = guard.table_name().to_string();

    if !capabilities.soft_delete {
        tx.delete(&table, guard.id())?;
        return Ok(());
    }

    let now = Utc::now();
    if let Some(soft) = guard.as_soft_delete_mut() {
        soft.set_deleted_at(Some(now));
    }
    if capabilities.timestamped {
        if let Some(ts) = guard.as_timestamped_mut() {
            ts.set_updated_at(now);
        }
    }
    tx.save(&table, row_of(&*guard)?)?;
    Ok(())
}

/// Inserts every member through one `bulk_create` call.
///
/// Members are written to the first member's table.
fn bulk_insert(
    tx: &mut (dyn StoreTransaction + '_),
    entities: &[EntityRef],
    batch_size: usize,
) -> CoreResult<()> {
    let mut table = None;
    let mut rows = Vec::with_capacity(entities.len());
    for entity in entities {
        let (t, row) = prepare_insert(entity)?;
        table.get_or_insert(t);
        rows.push(row);
    }
    let Some(table) = table else {
        return Ok(());
    };

    let ids = tx.bulk_create(&table, rows, batch_size)?;
    for (entity, id) in entities.iter().zip(ids) {
        entity.write().set_id(id);
    }
    Ok(())
}

/// Deletes members in one call unless any of them soft deletes.
fn bulk_delete(tx: &mut (dyn StoreTransaction + '_), entities: &[EntityRef]) -> CoreResult<()> {
    if entities.iter().any(|e| e.capabilities().soft_delete) {
        return entities.iter().try_for_each(|entity| delete_one(tx, entity));
    }
    let Some(first) = entities.first() else {
        return Ok(());
    };
    let table = first.table_name();
    let ids: Vec<u64> = entities.iter().map(EntityRef::id).collect();
    tx.bulk_delete(&table, &ids)?;
    Ok(())
}
