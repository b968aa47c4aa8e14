//! Property/activity/event use-case service.
//!
//! # Responsibility
//! - Provide the create/read/update/delete entry points behind every REST
//!   verb of the API surface.
//! - Route event writes through the event validator and schema mutations
//!   through the relation maintainer.
//!
//! # Invariants
//! - Every mutating use case runs in one IMMEDIATE transaction, so a failed
//!   validation or cascade leaves no partial write behind.
//! - Partial updates overwrite only fields the caller supplied non-empty.
//! - Update use cases return the document as stored before the update.

use crate::model::activity::{Activity, ActivityId};
use crate::model::event::{Event, EventId};
use crate::model::property::{Property, PropertyId};
use crate::model::value::{Shape, ValueType};
use crate::model::RecordValidationError;
use crate::repo::activity_repo::{ActivityRepository, SqliteActivityRepository};
use crate::repo::event_repo::{EventRepository, SqliteEventRepository};
use crate::repo::property_repo::{PropertyRepository, SqlitePropertyRepository};
use crate::repo::{Collection, RepoError};
use crate::service::event_validator::{EventValidator, SuppliedValues, ValidationError};
use crate::service::relation_service::{CascadeError, CascadeReport, RelationMaintainer};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::Number;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Client-facing classification of a service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    ServerFault,
}

/// Errors from catalog use cases.
#[derive(Debug)]
pub enum ServiceError {
    NotFound {
        collection: Collection,
        id: Uuid,
    },
    NameNotFound {
        collection: Collection,
        name: String,
    },
    DuplicateKey {
        collection: Collection,
        name: String,
    },
    InvalidValueType(String),
    InvalidRecord(RecordValidationError),
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
    MalformedReference(String),
    /// Data corruption detected mid-cascade; the transaction was rolled back.
    CascadeInvariant(CascadeError),
    /// Store failure or undecodable stored document.
    Store(RepoError),
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } | Self::NameNotFound { .. } => ErrorClass::NotFound,
            Self::DuplicateKey { .. }
            | Self::InvalidValueType(_)
            | Self::InvalidRecord(_)
            | Self::TypeMismatch { .. }
            | Self::InvalidTimestamp { .. }
            | Self::MalformedReference(_) => ErrorClass::BadRequest,
            Self::CascadeInvariant(_) | Self::Store(_) => ErrorClass::ServerFault,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::NameNotFound { .. } => "not_found",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::InvalidValueType(_) => "invalid_value_type",
            Self::InvalidRecord(_) => "invalid_record",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::InvalidTimestamp { .. } => "invalid_timestamp",
            Self::MalformedReference(_) => "malformed_reference",
            Self::CascadeInvariant(_) => "cascade_invariant",
            Self::Store(_) => "store_unavailable",
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { collection, id } => {
                write!(f, "{} not found: {id}", collection.record_name())
            }
            Self::NameNotFound { collection, name } => {
                write!(f, "{} not found by name: `{name}`", collection.record_name())
            }
            Self::DuplicateKey { collection, name } => write!(
                f,
                "duplicate key: {} named `{name}` already exists",
                collection.record_name()
            ),
            Self::InvalidValueType(tag) => write!(
                f,
                "{}",
                RecordValidationError::UnknownValueType(tag.clone())
            ),
            Self::InvalidRecord(err) => write!(f, "{err}"),
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
            Self::CascadeInvariant(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRecord(err) => Some(err),
            Self::CascadeInvariant(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { collection, id } => Self::NotFound { collection, id },
            RepoError::NameNotFound { collection, name } => Self::NameNotFound { collection, name },
            RepoError::DuplicateKey { collection, name } => Self::DuplicateKey { collection, name },
            RepoError::Validation(err) => Self::InvalidRecord(err),
            other => Self::Store(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::ActivityNotFound(id) => Self::NotFound {
                collection: Collection::Activities,
                id,
            },
            ValidationError::PropertyNotFound(id) => Self::NotFound {
                collection: Collection::Properties,
                id,
            },
            ValidationError::TypeMismatch {
                property_id,
                supplied,
                expected,
            } => Self::TypeMismatch {
                property_id,
                supplied,
                expected,
            },
            ValidationError::InvalidTimestamp {
                property_id,
                label,
                timestamp,
            } => Self::InvalidTimestamp {
                property_id,
                label,
                timestamp,
            },
            ValidationError::MalformedReference(value) => Self::MalformedReference(value),
            ValidationError::Repo(err) => err.into(),
        }
    }
}

impl From<CascadeError> for ServiceError {
    fn from(value: CascadeError) -> Self {
        match value {
            CascadeError::PropertyNotFound(id) => Self::NotFound {
                collection: Collection::Properties,
                id,
            },
            CascadeError::Repo(err) => err.into(),
            invariant => Self::CascadeInvariant(invariant),
        }
    }
}

/// Partial property update; `None` or blank fields keep stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub value_data_type: Option<String>,
}

/// Partial activity update; `defined_properties = Some(..)` replaces the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub defined_properties: Option<Vec<PropertyId>>,
}

struct Stores<'conn> {
    properties: SqlitePropertyRepository<'conn>,
    activities: SqliteActivityRepository<'conn>,
    events: SqliteEventRepository<'conn>,
}

impl<'conn> Stores<'conn> {
    fn try_new(conn: &'conn Connection) -> ServiceResult<Self> {
        Ok(Self {
            properties: SqlitePropertyRepository::try_new(conn)?,
            activities: SqliteActivityRepository::try_new(conn)?,
            events: SqliteEventRepository::try_new(conn)?,
        })
    }

    fn validator(&self) -> EventValidator<'_, SqlitePropertyRepository<'conn>, SqliteActivityRepository<'conn>> {
        EventValidator::new(&self.properties, &self.activities)
    }

    fn maintainer(
        &self,
    ) -> RelationMaintainer<
        '_,
        SqlitePropertyRepository<'conn>,
        SqliteActivityRepository<'conn>,
        SqliteEventRepository<'conn>,
    > {
        RelationMaintainer::new(&self.properties, &self.activities, &self.events)
    }

    fn require_property(&self, id: PropertyId) -> ServiceResult<Property> {
        self.properties.get_property(id)?.ok_or(ServiceError::NotFound {
            collection: Collection::Properties,
            id,
        })
    }

    fn require_activity(&self, id: ActivityId) -> ServiceResult<Activity> {
        self.activities.get_activity(id)?.ok_or(ServiceError::NotFound {
            collection: Collection::Activities,
            id,
        })
    }

    fn require_event(&self, id: EventId) -> ServiceResult<Event> {
        self.events.get_event(id)?.ok_or(ServiceError::NotFound {
            collection: Collection::Events,
            id,
        })
    }

    fn require_properties_exist(&self, ids: &[PropertyId]) -> ServiceResult<()> {
        for id in ids {
            self.require_property(*id)?;
        }
        Ok(())
    }
}

/// Catalog use-case facade over one SQLite connection.
pub struct CatalogService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> CatalogService<'conn> {
    /// Creates a service over a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ServiceResult<Self> {
        Stores::try_new(conn)?;
        Ok(Self { conn })
    }

    // ---- properties ----

    /// Creates a property after normalizing and checking its value type.
    pub fn create_property(
        &self,
        name: &str,
        description: &str,
        value_data_type: &str,
    ) -> ServiceResult<Property> {
        let value_data_type = parse_value_type(value_data_type)?;
        let property = Property::new(name.trim(), description, value_data_type);
        self.in_transaction("property_create", |stores| {
            stores.properties.create_property(&property)?;
            Ok(property)
        })
    }

    /// Applies a partial update; a changed value type resets dependent values.
    pub fn update_property(&self, id: PropertyId, update: &PropertyUpdate) -> ServiceResult<Property> {
        let next_type = match non_blank(update.value_data_type.as_deref()) {
            Some(tag) => Some(parse_value_type(tag)?),
            None => None,
        };

        self.in_transaction("property_update", |stores| {
            let previous = stores.require_property(id)?;
            let mut next = previous.clone();
            if let Some(name) = non_blank(update.name.as_deref()) {
                next.name = name.trim().to_string();
            }
            if let Some(description) = non_blank(update.description.as_deref()) {
                next.description = description.to_string();
            }
            if let Some(value_data_type) = next_type {
                next.value_data_type = value_data_type;
            }
            stores.properties.update_property(&next)?;

            let report = stores.maintainer().property_type_changed(
                id,
                previous.value_data_type,
                next.value_data_type,
            )?;
            log_cascade("property_type_change", id, report);
            Ok(previous)
        })
    }

    /// Deletes a property and removes it from every activity and event.
    pub fn delete_property(&self, id: PropertyId) -> ServiceResult<()> {
        self.in_transaction("property_delete", |stores| {
            stores.properties.delete_property(id)?;
            let report = stores.maintainer().property_deleted(id)?;
            log_cascade("property_delete", id, report);
            Ok(())
        })
    }

    pub fn get_property(&self, id: PropertyId) -> ServiceResult<Property> {
        self.read(|stores| stores.require_property(id))
    }

    pub fn get_property_by_name(&self, name: &str) -> ServiceResult<Property> {
        self.read(|stores| {
            stores
                .properties
                .get_property_by_name(name)?
                .ok_or_else(|| ServiceError::NameNotFound {
                    collection: Collection::Properties,
                    name: name.to_string(),
                })
        })
    }

    pub fn list_properties(&self) -> ServiceResult<Vec<Property>> {
        self.read(|stores| Ok(stores.properties.list_properties()?))
    }

    // ---- activities ----

    /// Creates an activity; every referenced property must exist.
    pub fn create_activity(
        &self,
        name: &str,
        description: &str,
        defined_properties: Vec<PropertyId>,
    ) -> ServiceResult<Activity> {
        let activity = Activity::new(name.trim(), description, defined_properties);
        self.in_transaction("activity_create", |stores| {
            stores.require_properties_exist(&activity.defined_properties)?;
            stores.activities.create_activity(&activity)?;
            Ok(activity)
        })
    }

    /// Applies a partial update and cascades property-set changes into events.
    pub fn update_activity(&self, id: ActivityId, update: &ActivityUpdate) -> ServiceResult<Activity> {
        self.in_transaction("activity_update", |stores| {
            let previous = stores.require_activity(id)?;
            let mut next = previous.clone();
            if let Some(name) = non_blank(update.name.as_deref()) {
                next.name = name.trim().to_string();
            }
            if let Some(description) = non_blank(update.description.as_deref()) {
                next.description = description.to_string();
            }
            if let Some(defined_properties) = &update.defined_properties {
                stores.require_properties_exist(defined_properties)?;
                next.defined_properties = defined_properties.clone();
            }
            stores.activities.update_activity(&next)?;

            if update.defined_properties.is_some() {
                let report = stores.maintainer().activity_properties_changed(
                    id,
                    &previous.defined_properties,
                    &next.defined_properties,
                )?;
                log_cascade("activity_properties_change", id, report);
            }
            Ok(previous)
        })
    }

    /// Deletes an activity. Its events are left in place.
    pub fn delete_activity(&self, id: ActivityId) -> ServiceResult<()> {
        self.in_transaction("activity_delete", |stores| {
            stores.activities.delete_activity(id)?;
            Ok(())
        })
    }

    pub fn get_activity(&self, id: ActivityId) -> ServiceResult<Activity> {
        self.read(|stores| stores.require_activity(id))
    }

    pub fn get_activity_by_name(&self, name: &str) -> ServiceResult<Activity> {
        self.read(|stores| {
            stores
                .activities
                .get_activity_by_name(name)?
                .ok_or_else(|| ServiceError::NameNotFound {
                    collection: Collection::Activities,
                    name: name.to_string(),
                })
        })
    }

    pub fn list_activities(&self) -> ServiceResult<Vec<Activity>> {
        self.read(|stores| Ok(stores.activities.list_activities()?))
    }

    // ---- events ----

    /// Validates `supplied` against the activity schema and stores the event.
    pub fn create_event(&self, activity_id: ActivityId, supplied: &SuppliedValues) -> ServiceResult<Event> {
        self.in_transaction("event_create", |stores| {
            let validated = stores.validator().validate(activity_id, supplied, None)?;
            let event = Event::new(validated.activity_id, validated.property_values);
            stores.events.create_event(&event)?;
            Ok(event)
        })
    }

    /// Re-validates an event; properties not resupplied keep their values.
    pub fn update_event(
        &self,
        id: EventId,
        activity_id: ActivityId,
        supplied: &SuppliedValues,
    ) -> ServiceResult<Event> {
        self.in_transaction("event_update", |stores| {
            let previous = stores.require_event(id)?;
            let validated =
                stores
                    .validator()
                    .validate(activity_id, supplied, Some(&previous.property_values))?;
            let next = Event {
                id,
                activity_id: validated.activity_id,
                property_values: validated.property_values,
            };
            stores.events.update_event(&next)?;
            Ok(previous)
        })
    }

    pub fn delete_event(&self, id: EventId) -> ServiceResult<()> {
        self.in_transaction("event_delete", |stores| {
            stores.events.delete_event(id)?;
            Ok(())
        })
    }

    pub fn get_event(&self, id: EventId) -> ServiceResult<Event> {
        self.read(|stores| stores.require_event(id))
    }

    pub fn list_events(&self) -> ServiceResult<Vec<Event>> {
        self.read(|stores| Ok(stores.events.list_events()?))
    }

    pub fn list_events_by_activity(&self, activity_id: ActivityId) -> ServiceResult<Vec<Event>> {
        self.read(|stores| Ok(stores.events.list_events_by_activity(activity_id)?))
    }

    fn read<T>(&self, work: impl FnOnce(&Stores<'_>) -> ServiceResult<T>) -> ServiceResult<T> {
        let stores = Stores::try_new(self.conn)?;
        work(&stores)
    }

    fn in_transaction<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&Stores<'_>) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;

        let outcome = Stores::try_new(&tx).and_then(|stores| work(&stores));
        match outcome {
            Ok(value) => {
                tx.commit().map_err(RepoError::from)?;
                info!(
                    "event={operation} module=service status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                // Dropping `tx` rolls back every write made by `work`.
                error!(
                    "event={operation} module=service status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }
}

fn parse_value_type(tag: &str) -> ServiceResult<ValueType> {
    ValueType::parse(tag).ok_or_else(|| ServiceError::InvalidValueType(tag.to_string()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn log_cascade(kind: &'static str, id: Uuid, report: CascadeReport) {
    info!(
        "event=cascade module=service status=ok kind={kind} id={id} activities={} events={}",
        report.activities_updated, report.events_updated
    );
}
