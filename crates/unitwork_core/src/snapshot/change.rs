//! Field-level change detection.

use crate::entity::FieldValues;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How a field changed between a snapshot and the live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldChangeKind {
    /// The field is new since the snapshot.
    Added,
    /// The field's value differs from the snapshot.
    Modified,
    /// The field no longer exists.
    Deleted,
}

impl fmt::Display for FieldChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single field difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// The field name.
    pub field_name: String,
    /// Value in the snapshot, `None` for added fields.
    pub old_value: Option<Value>,
    /// Current value, `None` for deleted fields.
    pub new_value: Option<Value>,
    /// Kind of change.
    pub kind: FieldChangeKind,
}

/// Changes keyed by field name.
pub type ChangeSet = BTreeMap<String, FieldChange>;

/// Diffs captured field values against current ones.
///
/// Fields present now but absent from `before` count as [`FieldChangeKind::Added`],
/// so a growing field set is always reported as a change.
pub(crate) fn diff(before: &FieldValues, after: &FieldValues) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (name, old) in before {
        match after.get(name) {
            None => {
                changes.insert(
                    name.clone(),
                    FieldChange {
                        field_name: name.clone(),
                        old_value: Some(old.clone()),
                        new_value: None,
                        kind: FieldChangeKind::Deleted,
                    },
                );
            }
            Some(new) if new != old => {
                changes.insert(
                    name.clone(),
                    FieldChange {
                        field_name: name.clone(),
                        old_value: Some(old.clone()),
                        new_value: Some(new.clone()),
                        kind: FieldChangeKind::Modified,
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (name, new) in after {
        if !before.contains_key(name) {
            changes.insert(
                name.clone(),
                FieldChange {
                    field_name: name.clone(),
                    old_value: None,
                    new_value: Some(new.clone()),
                    kind: FieldChangeKind::Added,
                },
            );
        }
    }

    changes
}

/// Returns true if `diff` would report any change.
pub(crate) fn differs(before: &FieldValues, after: &FieldValues) -> bool {
    before.iter().any(|(name, old)| after.get(name) != Some(old))
        || after.keys().any(|name| !before.contains_key(name))
}
