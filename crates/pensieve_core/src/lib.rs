//! Core domain logic for Pensieve.
//! Owns the property/activity/event schema rules and keeps the three
//! collections referentially consistent.

pub mod api;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use api::{ApiResponse, ApiStatus};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::activity::{Activity, ActivityId};
pub use model::event::{Event, EventId, PropertyValue};
pub use model::property::{Property, PropertyId};
pub use model::value::{is_valid_type, Shape, Timelings, Value, ValueType};
pub use model::RecordValidationError;
pub use repo::{Collection, RepoError, RepoResult};
pub use service::catalog_service::{
    ActivityUpdate, CatalogService, ErrorClass, PropertyUpdate, ServiceError, ServiceResult,
};
pub use service::event_validator::{EventValidator, SuppliedValues, ValidatedEvent, ValidationError};
pub use service::relation_service::{CascadeError, CascadeReport, RelationMaintainer};

/// Returns the core crate version, reported by `pensieve --version`.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
