//! Optional entity capabilities.

use chrono::{DateTime, Utc};
use std::fmt;

/// Entities that record creation and modification times.
///
/// Stamped on insert (both) and on update or soft delete (`updated_at`).
pub trait Timestamped {
    /// Returns the creation time.
    fn created_at(&self) -> DateTime<Utc>;
    /// Sets the creation time.
    fn set_created_at(&mut self, at: DateTime<Utc>);
    /// Returns the last modification time.
    fn updated_at(&self) -> DateTime<Utc>;
    /// Sets the last modification time.
    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

/// Entities protected by an optimistic lock revision.
///
/// Updates only match the stored row if its revision column still holds
/// the revision the entity was loaded with.
pub trait Revisioned {
    /// Returns the current revision.
    fn revision(&self) -> u64;

    /// Sets the revision.
    fn set_revision(&mut self, revision: u64);

    /// Returns the revision the next successful update will write.
    fn next_revision(&self) -> u64 {
        self.revision() + 1
    }

    /// Returns the name of the revision column.
    fn revision_column(&self) -> &str {
        "revision"
    }
}

/// Entities that are marked deleted instead of being removed.
pub trait SoftDelete {
    /// Returns the deletion time, `None` while the entity is live.
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Sets the deletion time.
    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>);

    /// Returns true if the entity has been soft deleted.
    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// Entities that check their own invariants before being written.
pub trait Validatable {
    /// Validates the entity.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first violation.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A validation failure reported by an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The offending field, if the failure is tied to one.
    pub field: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    /// Creates an error not tied to a field.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// Creates an error for a specific field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Capabilities an entity exposed when it was wrapped in an
/// [`EntityRef`](super::EntityRef).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Implements [`Timestamped`].
    pub timestamped: bool,
    /// Implements [`Revisioned`].
    pub revisioned: bool,
    /// Implements [`SoftDelete`].
    pub soft_delete: bool,
    /// Implements [`Validatable`].
    pub validatable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        assert_eq!(ValidationError::new("bad").to_string(), "bad");
        assert_eq!(
            ValidationError::field("name", "must not be empty").to_string(),
            "name: must not be empty"
        );
    }
}
