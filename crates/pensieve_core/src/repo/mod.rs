//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define identity-keyed CRUD contracts for the three document collections.
//! - Isolate SQLite query and JSON column details from services.
//!
//! # Invariants
//! - Repositories never type-check event values and never cascade; the
//!   event validator and relation maintainer own those rules.
//! - Unique-name violations surface as `RepoError::DuplicateKey`.
//! - Read paths reject undecodable persisted documents instead of masking them.

pub mod activity_repo;
pub mod event_repo;
pub mod property_repo;

use crate::db::DbError;
use crate::model::RecordValidationError;
use rusqlite::ErrorCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Persisted document collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Properties,
    Activities,
    Events,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Properties => "properties",
            Self::Activities => "activities",
            Self::Events => "events",
        }
    }

    /// Singular record noun used in messages.
    pub fn record_name(self) -> &'static str {
        match self {
            Self::Properties => "property",
            Self::Activities => "activity",
            Self::Events => "event",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Record violates a model invariant and was not written.
    Validation(RecordValidationError),
    /// Store transport or bootstrap failure.
    Db(DbError),
    NotFound {
        collection: Collection,
        id: Uuid,
    },
    NameNotFound {
        collection: Collection,
        name: String,
    },
    /// Unique `name` index rejected the write.
    DuplicateKey {
        collection: Collection,
        name: String,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
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
            Self::InvalidData(message) => write!(f, "invalid persisted document: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordValidationError> for RepoError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Maps a unique-index violation on `name` to `DuplicateKey`.
pub(crate) fn map_write_error(err: rusqlite::Error, collection: Collection, name: &str) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return RepoError::DuplicateKey {
                collection,
                name: name.to_string(),
            };
        }
    }
    err.into()
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn encode_json<T: Serialize + ?Sized>(value: &T, column: &'static str) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {column}: {err}")))
}

pub(crate) fn decode_json<T: DeserializeOwned>(text: &str, column: &'static str) -> RepoResult<T> {
    serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("cannot decode {column}: {err}")))
}
