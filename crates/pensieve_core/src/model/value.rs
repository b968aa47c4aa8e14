//! Value type registry and typed property values.
//!
//! # Responsibility
//! - Enumerate the closed set of value types a property may declare.
//! - Provide the default ("null") value for each type.
//! - Classify raw JSON payloads and decode them against a declared type.
//!
//! # Invariants
//! - Tags are canonical lowercase strings (`string`, `integer`, `float`,
//!   `timelings`, `string array`, `integer array`, `float array`).
//! - A decoded `Value` always has the variant its declared type maps to.
//! - Every timestamp inside a `timelings` value decodes to a non-zero instant.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Tag string to UNIX timestamp (seconds) mapping.
pub type Timelings = BTreeMap<String, i64>;

/// Closed registry of property value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueType {
    String,
    Integer,
    Float,
    Timelings,
    StringArray,
    IntegerArray,
    FloatArray,
}

impl ValueType {
    /// Every registry member, in declaration order.
    pub const ALL: [ValueType; 7] = [
        ValueType::String,
        ValueType::Integer,
        ValueType::Float,
        ValueType::Timelings,
        ValueType::StringArray,
        ValueType::IntegerArray,
        ValueType::FloatArray,
    ];

    /// Canonical tag persisted in `properties.value_data_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Timelings => "timelings",
            Self::StringArray => "string array",
            Self::IntegerArray => "integer array",
            Self::FloatArray => "float array",
        }
    }

    /// Parses a user-supplied tag.
    ///
    /// Input is trimmed and lowercased first. `number` and `number array` are
    /// accepted as aliases of the integer types.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "string" => Some(Self::String),
            "integer" | "number" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "timelings" => Some(Self::Timelings),
            "string array" => Some(Self::StringArray),
            "integer array" | "number array" => Some(Self::IntegerArray),
            "float array" => Some(Self::FloatArray),
            _ => None,
        }
    }

    /// Default value synthesized for omitted or reset properties.
    pub fn default_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::Integer(0),
            Self::Float => Value::Float(0.0),
            Self::Timelings => Value::Timelings(Timelings::new()),
            Self::StringArray => Value::StringArray(Vec::new()),
            Self::IntegerArray => Value::IntegerArray(Vec::new()),
            Self::FloatArray => Value::FloatArray(Vec::new()),
        }
    }

    /// Returns whether a raw payload of `shape` can be decoded as this type.
    ///
    /// Integer literals widen to floats; an empty array fits every array type.
    pub fn accepts(self, shape: Shape) -> bool {
        matches!(
            (self, shape),
            (Self::String, Shape::String)
                | (Self::Integer, Shape::Integer)
                | (Self::Float, Shape::Float | Shape::Integer)
                | (Self::Timelings, Shape::Timelings)
                | (Self::StringArray, Shape::StringArray | Shape::EmptyArray)
                | (Self::IntegerArray, Shape::IntegerArray | Shape::EmptyArray)
                | (
                    Self::FloatArray,
                    Shape::FloatArray | Shape::IntegerArray | Shape::EmptyArray
                )
        )
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ValueType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown value data type `{value}`"))
    }
}

impl From<ValueType> for String {
    fn from(value: ValueType) -> Self {
        value.as_str().to_string()
    }
}

/// Returns whether `tag` names a registry member.
pub fn is_valid_type(tag: &str) -> bool {
    ValueType::parse(tag).is_some()
}

/// Observed runtime shape of a raw JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Null,
    Boolean,
    String,
    Integer,
    Float,
    /// Object whose values are all numbers (includes `{}`).
    Timelings,
    /// Any other object.
    Object,
    EmptyArray,
    StringArray,
    IntegerArray,
    /// Numeric array with at least one non-integer element.
    FloatArray,
    MixedArray,
}

impl Shape {
    /// Classifies a raw JSON value.
    pub fn of(raw: &JsonValue) -> Self {
        match raw {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(_) => Self::Boolean,
            JsonValue::String(_) => Self::String,
            JsonValue::Number(number) => {
                if number.as_i64().is_some() {
                    Self::Integer
                } else {
                    Self::Float
                }
            }
            JsonValue::Object(map) => {
                if map.values().all(JsonValue::is_number) {
                    Self::Timelings
                } else {
                    Self::Object
                }
            }
            JsonValue::Array(items) => classify_array(items),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Timelings => "timelings",
            Self::Object => "object",
            Self::EmptyArray => "empty array",
            Self::StringArray => "string array",
            Self::IntegerArray => "integer array",
            Self::FloatArray => "float array",
            Self::MixedArray => "mixed array",
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn classify_array(items: &[JsonValue]) -> Shape {
    if items.is_empty() {
        return Shape::EmptyArray;
    }

    let mut strings = 0usize;
    let mut integers = 0usize;
    for item in items {
        match Shape::of(item) {
            Shape::String => strings += 1,
            Shape::Integer => integers += 1,
            Shape::Float => {}
            _ => return Shape::MixedArray,
        }
    }

    if strings == items.len() {
        Shape::StringArray
    } else if integers == items.len() {
        Shape::IntegerArray
    } else if strings == 0 {
        Shape::FloatArray
    } else {
        Shape::MixedArray
    }
}

/// Typed property value.
///
/// Persisted in tagged form (`{"type": "float array", "data": [...]}`) so a
/// stored empty array or whole float keeps its declared type on read-back.
/// Use [`Value::to_json`] for the plain wire representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    #[serde(rename = "string")]
    String(String),
    #[serde(rename = "integer")]
    Integer(i64),
    #[serde(rename = "float")]
    Float(f64),
    #[serde(rename = "timelings")]
    Timelings(Timelings),
    #[serde(rename = "string array")]
    StringArray(Vec<String>),
    #[serde(rename = "integer array")]
    IntegerArray(Vec<i64>),
    #[serde(rename = "float array")]
    FloatArray(Vec<f64>),
}

impl Value {
    /// Decodes a raw JSON payload against the declared type.
    ///
    /// # Errors
    /// - `TypeMismatch` when the payload shape does not fit `expected`.
    /// - `InvalidTimestamp` when a `timelings` entry is zero or out of range.
    pub fn decode(raw: &JsonValue, expected: ValueType) -> Result<Self, ValueError> {
        let shape = Shape::of(raw);
        if !expected.accepts(shape) {
            return Err(ValueError::TypeMismatch {
                supplied: shape,
                expected,
            });
        }

        let decoded = match expected {
            ValueType::String => raw.as_str().map(|text| Self::String(text.to_string())),
            ValueType::Integer => raw.as_i64().map(Self::Integer),
            ValueType::Float => raw.as_f64().map(Self::Float),
            ValueType::Timelings => match raw.as_object() {
                Some(map) => Some(Self::Timelings(decode_timelings(map)?)),
                None => None,
            },
            ValueType::StringArray => {
                decode_array(raw, |item| item.as_str().map(str::to_string)).map(Self::StringArray)
            }
            ValueType::IntegerArray => decode_array(raw, JsonValue::as_i64).map(Self::IntegerArray),
            ValueType::FloatArray => decode_array(raw, JsonValue::as_f64).map(Self::FloatArray),
        };
        decoded.ok_or(ValueError::TypeMismatch {
            supplied: shape,
            expected,
        })
    }

    /// Registry type this value belongs to.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::Timelings(_) => ValueType::Timelings,
            Self::StringArray(_) => ValueType::StringArray,
            Self::IntegerArray(_) => ValueType::IntegerArray,
            Self::FloatArray(_) => ValueType::FloatArray,
        }
    }

    /// Plain JSON wire representation.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::String(text) => JsonValue::from(text.as_str()),
            Self::Integer(number) => JsonValue::from(*number),
            Self::Float(number) => JsonValue::from(*number),
            Self::Timelings(timelings) => JsonValue::Object(
                timelings
                    .iter()
                    .map(|(label, stamp)| (label.clone(), JsonValue::from(*stamp)))
                    .collect(),
            ),
            Self::StringArray(items) => JsonValue::from(items.clone()),
            Self::IntegerArray(items) => JsonValue::from(items.clone()),
            Self::FloatArray(items) => JsonValue::from(items.clone()),
        }
    }
}

fn decode_array<T>(raw: &JsonValue, item: impl Fn(&JsonValue) -> Option<T>) -> Option<Vec<T>> {
    raw.as_array()?.iter().map(item).collect()
}

/// Returns whether `timestamp` (UNIX seconds) decodes to a non-zero instant.
pub fn is_valid_timestamp(timestamp: i64) -> bool {
    timestamp != 0 && DateTime::from_timestamp(timestamp, 0).is_some()
}

/// Every entry must be an integer that passes [`is_valid_timestamp`].
fn decode_timelings(map: &serde_json::Map<String, JsonValue>) -> Result<Timelings, ValueError> {
    let mut timelings = Timelings::new();
    for (label, stamp) in map {
        match stamp.as_i64().filter(|stamp| is_valid_timestamp(*stamp)) {
            Some(stamp) => {
                timelings.insert(label.clone(), stamp);
            }
            None => {
                return Err(ValueError::InvalidTimestamp {
                    label: label.clone(),
                    timestamp: stamp_number(stamp),
                })
            }
        }
    }
    Ok(timelings)
}

fn stamp_number(stamp: &JsonValue) -> Number {
    match stamp {
        JsonValue::Number(number) => number.clone(),
        _ => Number::from(0),
    }
}

/// Decode failure for one raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    TypeMismatch { supplied: Shape, expected: ValueType },
    /// `timestamp` keeps the raw number, which may not fit `i64`.
    InvalidTimestamp { label: String, timestamp: Number },
}

impl Display for ValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { supplied, expected } => {
                write!(f, "given value type `{supplied}`, expected `{expected}`")
            }
            Self::InvalidTimestamp { label, timestamp } => {
                write!(f, "invalid UNIX timestamp {timestamp} for timeling `{label}`")
            }
        }
    }
}

impl Error for ValueError {}
