//! Property repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and by-name lookup over the `properties` collection.
//!
//! # Invariants
//! - Write paths call `Property::validate()` before SQL mutations.
//! - `value_data_type` is stored as the canonical registry tag.

use crate::db::migrations::ensure_migrated;
use crate::model::property::{Property, PropertyId};
use crate::model::value::ValueType;
use crate::repo::{map_write_error, parse_uuid, Collection, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PROPERTY_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    value_data_type
FROM properties";

/// Repository interface for the `properties` collection.
pub trait PropertyRepository {
    fn create_property(&self, property: &Property) -> RepoResult<PropertyId>;
    /// Replaces the stored document with the same id.
    fn update_property(&self, property: &Property) -> RepoResult<()>;
    fn get_property(&self, id: PropertyId) -> RepoResult<Option<Property>>;
    fn get_property_by_name(&self, name: &str) -> RepoResult<Option<Property>>;
    /// Lists all properties sorted by name.
    fn list_properties(&self) -> RepoResult<Vec<Property>>;
    fn delete_property(&self, id: PropertyId) -> RepoResult<()>;
}

/// SQLite-backed property repository.
pub struct SqlitePropertyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePropertyRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_migrated(conn)?;
        Ok(Self { conn })
    }
}

impl PropertyRepository for SqlitePropertyRepository<'_> {
    fn create_property(&self, property: &Property) -> RepoResult<PropertyId> {
        property.validate()?;

        self.conn
            .execute(
                "INSERT INTO properties (id, name, description, value_data_type)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    property.id.to_string(),
                    property.name.as_str(),
                    property.description.as_str(),
                    property.value_data_type.as_str(),
                ],
            )
            .map_err(|err| map_write_error(err, Collection::Properties, &property.name))?;

        Ok(property.id)
    }

    fn update_property(&self, property: &Property) -> RepoResult<()> {
        property.validate()?;

        let changed = self
            .conn
            .execute(
                "UPDATE properties
                 SET
                    name = ?2,
                    description = ?3,
                    value_data_type = ?4,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    property.id.to_string(),
                    property.name.as_str(),
                    property.description.as_str(),
                    property.value_data_type.as_str(),
                ],
            )
            .map_err(|err| map_write_error(err, Collection::Properties, &property.name))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                collection: Collection::Properties,
                id: property.id,
            });
        }
        Ok(())
    }

    fn get_property(&self, id: PropertyId) -> RepoResult<Option<Property>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROPERTY_SELECT_SQL} WHERE id = ?1;"))?;
        stmt.query_row([id.to_string()], |row| Ok(parse_property_row(row)))
            .optional()?
            .transpose()
    }

    fn get_property_by_name(&self, name: &str) -> RepoResult<Option<Property>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROPERTY_SELECT_SQL} WHERE name = ?1;"))?;
        stmt.query_row([name], |row| Ok(parse_property_row(row)))
            .optional()?
            .transpose()
    }

    fn list_properties(&self) -> RepoResult<Vec<Property>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROPERTY_SELECT_SQL} ORDER BY name ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut properties = Vec::new();
        while let Some(row) = rows.next()? {
            properties.push(parse_property_row(row)?);
        }
        Ok(properties)
    }

    fn delete_property(&self, id: PropertyId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM properties WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                collection: Collection::Properties,
                id,
            });
        }
        Ok(())
    }
}

fn parse_property_row(row: &Row<'_>) -> RepoResult<Property> {
    let id_text: String = row.get("id")?;
    let type_text: String = row.get("value_data_type")?;
    let value_data_type = ValueType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid value type `{type_text}` in properties.value_data_type"
        ))
    })?;

    Ok(Property {
        id: parse_uuid(&id_text, "properties.id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        value_data_type,
    })
}
