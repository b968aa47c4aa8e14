//! Property domain model.
//!
//! # Responsibility
//! - Define the typed field definition referenced by activities.
//!
//! # Invariants
//! - `name` is unique across all properties (enforced by the store).
//! - `value_data_type` is a registry member by construction.
//! - Changing `value_data_type` resets dependent event values; deleting a
//!   property removes it from every activity and event.

use crate::model::value::ValueType;
use crate::model::RecordValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable property identifier.
pub type PropertyId = Uuid;

/// Named, typed field definition usable by one or more activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub description: String,
    pub value_data_type: ValueType,
}

impl Property {
    /// Creates a property with a generated id.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        value_data_type: ValueType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            value_data_type,
        }
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.id.is_nil() {
            return Err(RecordValidationError::NilId);
        }
        if self.name.trim().is_empty() {
            return Err(RecordValidationError::EmptyName);
        }
        Ok(())
    }
}
