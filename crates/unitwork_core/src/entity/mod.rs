//! Entity capability model.
//!
//! An entity is any record a unit of work can persist. Every entity exposes
//! an identifier, a table name and its field values; optional capabilities
//! (timestamps, revisions, soft delete, validation) are exposed through the
//! `as_*` accessors and picked up automatically when present.

mod base;
mod capability;
mod fields;
mod handle;

pub use base::BaseEntity;
pub use capability::{
    Capabilities, Revisioned, SoftDelete, Timestamped, Validatable, ValidationError,
};
pub use fields::{FieldSource, FieldValues};
pub use handle::{shared, EntityKey, EntityRef, EntityType, Identity, Shared};

/// A record that can be tracked by a unit of work.
///
/// Field values come from the [`FieldSource`] supertrait, which every
/// `serde::Serialize` type implements automatically.
///
/// # Example
///
/// ```rust
/// use serde::Serialize;
/// use unitwork_core::entity::{BaseEntity, Entity, Timestamped};
///
/// #[derive(Serialize)]
/// struct Note {
///     #[serde(flatten)]
///     base: BaseEntity,
///     text: String,
/// }
///
/// impl Entity for Note {
///     fn id(&self) -> u64 {
///         self.base.id
///     }
///     fn set_id(&mut self, id: u64) {
///         self.base.id = id;
///     }
///     fn table_name(&self) -> &str {
///         "notes"
///     }
///     fn as_timestamped_mut(&mut self) -> Option<&mut dyn Timestamped> {
///         Some(&mut self.base)
///     }
/// }
/// ```
pub trait Entity: FieldSource + Send + Sync + 'static {
    /// Returns the primary key, zero if not yet persisted.
    fn id(&self) -> u64;

    /// Sets the primary key after insertion.
    fn set_id(&mut self, id: u64);

    /// Returns the table the entity is stored in.
    fn table_name(&self) -> &str;

    /// Returns true if the entity has never been persisted.
    fn is_new(&self) -> bool {
        self.id() == 0
    }

    /// Returns the timestamp capability, if implemented.
    fn as_timestamped_mut(&mut self) -> Option<&mut dyn Timestamped> {
        None
    }

    /// Returns the optimistic lock capability, if implemented.
    fn as_revisioned_mut(&mut self) -> Option<&mut dyn Revisioned> {
        None
    }

    /// Returns the soft delete capability, if implemented.
    fn as_soft_delete_mut(&mut self) -> Option<&mut dyn SoftDelete> {
        None
    }

    /// Returns the validation capability, if implemented.
    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}
