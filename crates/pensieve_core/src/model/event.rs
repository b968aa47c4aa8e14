//! Event domain model.
//!
//! # Responsibility
//! - Define one recorded observation tied to exactly one activity.
//!
//! # Invariants
//! - `property_values` holds at most one pair per property id.
//! - In steady state the key set equals the activity's declared properties
//!   and every value matches its property's declared type.

use crate::model::activity::ActivityId;
use crate::model::property::PropertyId;
use crate::model::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable event identifier.
pub type EventId = Uuid;

/// One `(property id, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub key: PropertyId,
    pub value: Value,
}

impl PropertyValue {
    pub fn new(key: PropertyId, value: Value) -> Self {
        Self { key, value }
    }
}

/// Recorded observation of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "activityID")]
    pub activity_id: ActivityId,
    #[serde(rename = "propertyValues")]
    pub property_values: Vec<PropertyValue>,
}

impl Event {
    /// Creates an event with a generated id.
    pub fn new(activity_id: ActivityId, property_values: Vec<PropertyValue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            activity_id,
            property_values,
        }
    }

    /// Returns the stored value for `property_id`, if present.
    pub fn value_of(&self, property_id: PropertyId) -> Option<&Value> {
        self.property_values
            .iter()
            .find(|pair| pair.key == property_id)
            .map(|pair| &pair.value)
    }

    /// Inserts or overwrites the value for `property_id`.
    pub fn set_value(&mut self, property_id: PropertyId, value: Value) {
        match self
            .property_values
            .iter_mut()
            .find(|pair| pair.key == property_id)
        {
            Some(pair) => pair.value = value,
            None => self
                .property_values
                .push(PropertyValue::new(property_id, value)),
        }
    }

    /// Removes the pair for `property_id`; returns the removed value.
    pub fn remove_value(&mut self, property_id: PropertyId) -> Option<Value> {
        let index = self
            .property_values
            .iter()
            .position(|pair| pair.key == property_id)?;
        Some(self.property_values.remove(index).value)
    }
}
