//! Activity domain model.
//!
//! # Responsibility
//! - Define the tracked-thing category and the properties its events carry.
//!
//! # Invariants
//! - `name` is unique across all activities (enforced by the store).
//! - Order of `defined_properties` carries no meaning; duplicates collapse to
//!   one declared property when events are validated.

use crate::model::property::PropertyId;
use crate::model::RecordValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Stable activity identifier.
pub type ActivityId = Uuid;

/// Named category of tracked thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub description: String,
    pub defined_properties: Vec<PropertyId>,
}

impl Activity {
    /// Creates an activity with a generated id.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        defined_properties: Vec<PropertyId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            defined_properties,
        }
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.id.is_nil() || self.defined_properties.iter().any(Uuid::is_nil) {
            return Err(RecordValidationError::NilId);
        }
        if self.name.trim().is_empty() {
            return Err(RecordValidationError::EmptyName);
        }
        Ok(())
    }

    /// Declared property ids with duplicates removed, first occurrence first.
    pub fn declared_properties(&self) -> Vec<PropertyId> {
        let mut seen = HashSet::new();
        self.defined_properties
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn declares(&self, property_id: PropertyId) -> bool {
        self.defined_properties.contains(&property_id)
    }

    /// Drops every occurrence of `property_id`; returns whether any was found.
    pub fn remove_property(&mut self, property_id: PropertyId) -> bool {
        let before = self.defined_properties.len();
        self.defined_properties.retain(|id| *id != property_id);
        self.defined_properties.len() != before
    }
}
