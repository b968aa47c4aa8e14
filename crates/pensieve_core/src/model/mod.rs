//! Domain model for properties, activities and events.
//!
//! # Responsibility
//! - Define the document shapes persisted in the `properties`, `activities`
//!   and `events` collections.
//! - Own the closed value-type registry used to type-check event payloads.
//!
//! # Invariants
//! - Every record is identified by a stable, non-nil `Uuid`.
//! - A property's `value_data_type` is always a registry member.
//! - Event shape is derived from its activity's declared properties.

pub mod activity;
pub mod event;
pub mod property;
pub mod value;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Record-level validation failure raised before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    /// Identity must never be the nil uuid.
    NilId,
    /// `name` is blank after trim.
    EmptyName,
    /// Value type tag is not part of the registry.
    UnknownValueType(String),
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "record id must not be nil"),
            Self::EmptyName => write!(f, "record name must not be blank"),
            Self::UnknownValueType(tag) => write!(
                f,
                "invalid data type `{tag}`; expected one of {}",
                value::ValueType::ALL
                    .iter()
                    .map(|value_type| value_type.as_str())
                    .collect::<Vec<_>>()
                    .join("|")
            ),
        }
    }
}

impl Error for RecordValidationError {}
