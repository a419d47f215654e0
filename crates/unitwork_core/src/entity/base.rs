//! Embeddable base entity.

use super::capability::{Revisioned, SoftDelete, Timestamped};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Common entity columns with every capability implemented.
///
/// Embed it with `#[serde(flatten)]` and return it from the entity's
/// `as_*` accessors. New instances start at revision 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseEntity {
    /// Primary key, zero until inserted.
    pub id: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Soft deletion time.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic lock revision.
    pub revision: u64,
}

impl Default for BaseEntity {
    fn default() -> Self {
        Self {
            id: 0,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            deleted_at: None,
            revision: 1,
        }
    }
}

impl BaseEntity {
    /// Creates a base for an already persisted row.
    #[must_use]
    pub fn persisted(id: u64, revision: u64) -> Self {
        Self {
            id,
            revision,
            ..Self::default()
        }
    }
}

impl Timestamped for BaseEntity {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

impl Revisioned for BaseEntity {
    fn revision(&self) -> u64 {
        self.revision
    }

    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

impl SoftDelete for BaseEntity {
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn set_deleted_at(&mut self, at: Option<DateTime<Utc>>) {
        self.deleted_at = at;
    }
}
