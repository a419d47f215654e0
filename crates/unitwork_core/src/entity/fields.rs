//! Field extraction.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field values of an entity, keyed by field name.
///
/// Values are owned JSON trees, so nested collections and records are
/// deep copies of the live entity.
pub type FieldValues = BTreeMap<String, Value>;

/// Types whose fields can be captured for snapshots and persistence.
///
/// Implemented for every `Serialize` type: the fields are the top-level
/// members of its serialized object. Fields marked `#[serde(skip)]` are not
/// captured. Types that do not serialize to an object have no fields.
pub trait FieldSource {
    /// Captures the current field values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FieldExtraction`] if serialization fails.
    fn field_values(&self) -> CoreResult<FieldValues>;
}

impl<T: Serialize + ?Sized> FieldSource for T {
    fn field_values(&self) -> CoreResult<FieldValues> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(_) => Ok(FieldValues::new()),
            Err(err) => Err(CoreError::field_extraction(
                std::any::type_name::<T>(),
                err.to_string(),
            )),
        }
    }
}
