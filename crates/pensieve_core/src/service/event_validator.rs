//! Event payload validation against an activity's dynamic schema.
//!
//! # Responsibility
//! - Resolve an activity's declared properties and type-check supplied raw
//!   values against each property's declared value type.
//! - Fill omitted properties with registry defaults (create) or carry
//!   forward previous values (update).
//!
//! # Invariants
//! - Validation is read-only; callers write only after it succeeds.
//! - The result covers exactly the activity's declared properties, in
//!   declaration order; supplied keys the activity does not declare are
//!   dropped.

use crate::model::activity::ActivityId;
use crate::model::event::PropertyValue;
use crate::model::property::PropertyId;
use crate::model::value::{Shape, Value, ValueError, ValueType};
use crate::repo::activity_repo::ActivityRepository;
use crate::repo::property_repo::PropertyRepository;
use crate::repo::RepoError;
use log::debug;
use serde_json::{Number, Value as JsonValue};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Raw caller values keyed by parsed property id.
pub type SuppliedValues = BTreeMap<PropertyId, JsonValue>;

/// Errors from event validation.
#[derive(Debug)]
pub enum ValidationError {
    ActivityNotFound(ActivityId),
    PropertyNotFound(PropertyId),
    TypeMismatch {
        property_id: PropertyId,
        supplied: Shape,
        expected: ValueType,
    },
    InvalidTimestamp {
        property_id: PropertyId,
        label: String,
        timestamp: Number,
    },
    /// An id string could not be parsed.
    MalformedReference(String),
    Repo(RepoError),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ActivityNotFound(id) => write!(f, "activity not found: {id}"),
            Self::PropertyNotFound(id) => write!(f, "property not found: {id}"),
            Self::TypeMismatch {
                property_id,
                supplied,
                expected,
            } => write!(
                f,
                "property {property_id}: given property value type `{supplied}`, expected property value type `{expected}`"
            ),
            Self::InvalidTimestamp {
                property_id,
                label,
                timestamp,
            } => write!(
                f,
                "property {property_id}: invalid UNIX timestamp {timestamp} for timeling `{label}`"
            ),
            Self::MalformedReference(value) => write!(f, "malformed reference: `{value}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ValidationError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Validated, complete value set ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub activity_id: ActivityId,
    pub property_values: Vec<PropertyValue>,
}

/// Parses one id string.
pub fn parse_reference(value: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(value.trim()).map_err(|_| ValidationError::MalformedReference(value.to_string()))
}

/// Parses the wire map keyed by stringified property ids.
///
/// Every key must parse, including keys the activity does not declare. Two
/// spellings of the same id (e.g. upper and lower case) are rejected.
pub fn parse_supplied_values(
    raw: BTreeMap<String, JsonValue>,
) -> Result<SuppliedValues, ValidationError> {
    let mut supplied = SuppliedValues::new();
    for (key, value) in raw {
        match supplied.entry(parse_reference(&key)?) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(_) => return Err(ValidationError::MalformedReference(key)),
        }
    }
    Ok(supplied)
}

/// Type-checks event payloads against activity/property definitions.
pub struct EventValidator<'r, P: PropertyRepository, A: ActivityRepository> {
    properties: &'r P,
    activities: &'r A,
}

impl<'r, P: PropertyRepository, A: ActivityRepository> EventValidator<'r, P, A> {
    pub fn new(properties: &'r P, activities: &'r A) -> Self {
        Self {
            properties,
            activities,
        }
    }

    /// Validates `supplied` against the activity's declared properties.
    ///
    /// `previous` is `Some` on update and holds the event's prior pairs.
    ///
    /// # Errors
    /// - `ActivityNotFound` / `PropertyNotFound` for dangling references.
    /// - `TypeMismatch` naming the property, supplied and expected shapes.
    /// - `InvalidTimestamp` for a zero/invalid instant in a `timelings` value.
    pub fn validate(
        &self,
        activity_id: ActivityId,
        supplied: &SuppliedValues,
        previous: Option<&[PropertyValue]>,
    ) -> Result<ValidatedEvent, ValidationError> {
        let activity = self
            .activities
            .get_activity(activity_id)?
            .ok_or(ValidationError::ActivityNotFound(activity_id))?;

        let previous: Option<HashMap<PropertyId, &Value>> = previous.map(|pairs| {
            pairs
                .iter()
                .map(|pair| (pair.key, &pair.value))
                .collect()
        });

        let declared = activity.declared_properties();
        let mut property_values = Vec::with_capacity(declared.len());
        for property_id in declared {
            let property = self
                .properties
                .get_property(property_id)?
                .ok_or(ValidationError::PropertyNotFound(property_id))?;

            let value = match supplied.get(&property_id) {
                Some(raw) => Value::decode(raw, property.value_data_type)
                    .map_err(|err| attach_property(property_id, err))?,
                None => match previous
                    .as_ref()
                    .and_then(|previous| previous.get(&property_id))
                {
                    Some(carried) => (*carried).clone(),
                    None => property.value_data_type.default_value(),
                },
            };
            property_values.push(PropertyValue::new(property_id, value));
        }

        let dropped = supplied
            .keys()
            .filter(|key| !activity.declares(**key))
            .count();
        if dropped > 0 {
            debug!(
                "event=event_validate module=service status=ok activity_id={} dropped_undeclared={}",
                activity_id, dropped
            );
        }

        Ok(ValidatedEvent {
            activity_id,
            property_values,
        })
    }
}

fn attach_property(property_id: PropertyId, err: ValueError) -> ValidationError {
    match err {
        ValueError::TypeMismatch { supplied, expected } => ValidationError::TypeMismatch {
            property_id,
            supplied,
            expected,
        },
        ValueError::InvalidTimestamp { label, timestamp } => ValidationError::InvalidTimestamp {
            property_id,
            label,
            timestamp,
        },
    }
}
