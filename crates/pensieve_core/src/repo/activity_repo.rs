//! Activity repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and by-name lookup over the `activities` collection.
//! - Answer "which activities reference this property" for cascades.
//!
//! # Invariants
//! - `defined_properties` is stored as a JSON array of uuid strings.
//! - References are not checked here; a dangling id is tolerated only while a
//!   property-delete cascade is running.

use crate::db::migrations::ensure_migrated;
use crate::model::activity::{Activity, ActivityId};
use crate::model::property::PropertyId;
use crate::repo::{
    decode_json, encode_json, map_write_error, parse_uuid, Collection, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ACTIVITY_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    defined_properties
FROM activities";

/// Repository interface for the `activities` collection.
pub trait ActivityRepository {
    fn create_activity(&self, activity: &Activity) -> RepoResult<ActivityId>;
    /// Replaces the stored document with the same id.
    fn update_activity(&self, activity: &Activity) -> RepoResult<()>;
    fn get_activity(&self, id: ActivityId) -> RepoResult<Option<Activity>>;
    fn get_activity_by_name(&self, name: &str) -> RepoResult<Option<Activity>>;
    /// Lists all activities sorted by name.
    fn list_activities(&self) -> RepoResult<Vec<Activity>>;
    /// Lists activities whose `defined_properties` contains `property_id`.
    fn list_activities_referencing(&self, property_id: PropertyId) -> RepoResult<Vec<Activity>>;
    fn delete_activity(&self, id: ActivityId) -> RepoResult<()>;
}

/// SQLite-backed activity repository.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_migrated(conn)?;
        Ok(Self { conn })
    }

    fn query_many(&self, sql: &str, bind: &[&dyn rusqlite::ToSql]) -> RepoResult<Vec<Activity>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(bind)?;
        let mut activities = Vec::new();
        while let Some(row) = rows.next()? {
            activities.push(parse_activity_row(row)?);
        }
        Ok(activities)
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn create_activity(&self, activity: &Activity) -> RepoResult<ActivityId> {
        activity.validate()?;
        let defined = encode_json(&activity.defined_properties, "activities.defined_properties")?;

        self.conn
            .execute(
                "INSERT INTO activities (id, name, description, defined_properties)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    activity.id.to_string(),
                    activity.name.as_str(),
                    activity.description.as_str(),
                    defined,
                ],
            )
            .map_err(|err| map_write_error(err, Collection::Activities, &activity.name))?;

        Ok(activity.id)
    }

    fn update_activity(&self, activity: &Activity) -> RepoResult<()> {
        activity.validate()?;
        let defined = encode_json(&activity.defined_properties, "activities.defined_properties")?;

        let changed = self
            .conn
            .execute(
                "UPDATE activities
                 SET
                    name = ?2,
                    description = ?3,
                    defined_properties = ?4,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    activity.id.to_string(),
                    activity.name.as_str(),
                    activity.description.as_str(),
                    defined,
                ],
            )
            .map_err(|err| map_write_error(err, Collection::Activities, &activity.name))?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                collection: Collection::Activities,
                id: activity.id,
            });
        }
        Ok(())
    }

    fn get_activity(&self, id: ActivityId) -> RepoResult<Option<Activity>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACTIVITY_SELECT_SQL} WHERE id = ?1;"))?;
        stmt.query_row([id.to_string()], |row| Ok(parse_activity_row(row)))
            .optional()?
            .transpose()
    }

    fn get_activity_by_name(&self, name: &str) -> RepoResult<Option<Activity>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACTIVITY_SELECT_SQL} WHERE name = ?1;"))?;
        stmt.query_row([name], |row| Ok(parse_activity_row(row)))
            .optional()?
            .transpose()
    }

    fn list_activities(&self) -> RepoResult<Vec<Activity>> {
        self.query_many(&format!("{ACTIVITY_SELECT_SQL} ORDER BY name ASC, id ASC;"), params![])
    }

    fn list_activities_referencing(&self, property_id: PropertyId) -> RepoResult<Vec<Activity>> {
        let property_id = property_id.to_string();
        self.query_many(
            &format!(
                "{ACTIVITY_SELECT_SQL}
                 WHERE EXISTS (
                    SELECT 1
                    FROM json_each(activities.defined_properties) refs
                    WHERE refs.value = ?1
                 )
                 ORDER BY name ASC, id ASC;"
            ),
            params![property_id],
        )
    }

    fn delete_activity(&self, id: ActivityId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM activities WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                collection: Collection::Activities,
                id,
            });
        }
        Ok(())
    }
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<Activity> {
    let id_text: String = row.get("id")?;
    let defined_text: String = row.get("defined_properties")?;

    Ok(Activity {
        id: parse_uuid(&id_text, "activities.id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        defined_properties: decode_json(&defined_text, "activities.defined_properties")?,
    })
}
