//! Rows, column maps and match predicates.

use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the primary key column.
///
/// When a row's column map contains this column, stores keep it equal to
/// the row's primary key.
pub const PRIMARY_KEY: &str = "id";

/// Column values of a row, ordered by column name.
pub type Columns = BTreeMap<String, Value>;

/// A single table row.
///
/// A zero `id` means the row has not been assigned a primary key yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    id: u64,
    columns: Columns,
}

impl Row {
    /// Creates a row from a primary key and column values.
    #[must_use]
    pub fn new(id: u64, columns: Columns) -> Self {
        Self { id, columns }.with_id(id)
    }

    /// Returns the primary key.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns all column values.
    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Returns a single column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Consumes the row, returning its column values.
    #[must_use]
    pub fn into_columns(self) -> Columns {
        self.columns
    }

    /// Returns the row with its primary key replaced.
    ///
    /// The `id` column is rewritten too if the row carries one.
    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        if let Some(column) = self.columns.get_mut(PRIMARY_KEY) {
            *column = Value::from(id);
        }
        self
    }
}

/// A conjunction of column equality clauses.
///
/// Used for conditional writes such as optimistic-lock updates that must
/// match `(id, revision)`.
///
/// ```rust
/// use unitwork_store::Predicate;
///
/// let predicate = Predicate::new().eq("id", 7).eq("revision", 3);
/// assert_eq!(predicate.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<(String, Value)>,
}

impl Predicate {
    /// Creates an empty predicate that matches every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `column = value` clause.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((column.into(), value.into()));
        self
    }

    /// Returns the clauses in insertion order.
    #[must_use]
    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// Returns the number of clauses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Returns true if the predicate has no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Checks whether a stored row satisfies every clause.
    #[must_use]
    pub fn matches(&self, id: u64, columns: &Columns) -> bool {
        self.clauses.iter().all(|(column, expected)| {
            if column == PRIMARY_KEY {
                expected.as_u64() == Some(id)
            } else {
                columns.get(column) == Some(expected)
            }
        })
    }
}
