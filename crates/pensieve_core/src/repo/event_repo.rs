//! Event repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over the `events` collection plus the by-activity query.
//! - Persist value sets exactly as given.
//!
//! # Invariants
//! - The store never rejects value types; every event reaching `create_event`
//!   or `update_event` has already passed the event validator.
//! - `property_values` is stored as a JSON array of `{key, value}` pairs with
//!   values in tagged form.

use crate::db::migrations::ensure_migrated;
use crate::model::activity::ActivityId;
use crate::model::event::{Event, EventId, PropertyValue};
use crate::repo::{decode_json, encode_json, parse_uuid, Collection, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    activity_id,
    property_values
FROM events";

/// Repository interface for the `events` collection.
pub trait EventRepository {
    fn create_event(&self, event: &Event) -> RepoResult<EventId>;
    /// Replaces activity reference and value set of the stored event.
    fn update_event(&self, event: &Event) -> RepoResult<()>;
    /// Replaces only the value set; used by cascades.
    fn update_event_values(&self, id: EventId, values: &[PropertyValue]) -> RepoResult<()>;
    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>>;
    fn list_events(&self) -> RepoResult<Vec<Event>>;
    fn list_events_by_activity(&self, activity_id: ActivityId) -> RepoResult<Vec<Event>>;
    fn delete_event(&self, id: EventId) -> RepoResult<()>;
}

/// SQLite-backed event repository.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_migrated(conn)?;
        Ok(Self { conn })
    }

    fn ensure_changed(changed: usize, id: EventId) -> RepoResult<()> {
        if changed == 0 {
            return Err(RepoError::NotFound {
                collection: Collection::Events,
                id,
            });
        }
        Ok(())
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn create_event(&self, event: &Event) -> RepoResult<EventId> {
        if event.id.is_nil() {
            return Err(RepoError::InvalidData("event id must not be nil".to_string()));
        }
        let values = encode_json(&event.property_values, "events.property_values")?;

        self.conn.execute(
            "INSERT INTO events (id, activity_id, property_values)
             VALUES (?1, ?2, ?3);",
            params![event.id.to_string(), event.activity_id.to_string(), values],
        )?;

        Ok(event.id)
    }

    fn update_event(&self, event: &Event) -> RepoResult<()> {
        let values = encode_json(&event.property_values, "events.property_values")?;

        let changed = self.conn.execute(
            "UPDATE events
             SET
                activity_id = ?2,
                property_values = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![event.id.to_string(), event.activity_id.to_string(), values],
        )?;
        Self::ensure_changed(changed, event.id)
    }

    fn update_event_values(&self, id: EventId, values: &[PropertyValue]) -> RepoResult<()> {
        let values = encode_json(values, "events.property_values")?;

        let changed = self.conn.execute(
            "UPDATE events
             SET
                property_values = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), values],
        )?;
        Self::ensure_changed(changed, id)
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} WHERE id = ?1;"))?;
        stmt.query_row([id.to_string()], |row| Ok(parse_event_row(row)))
            .optional()?
            .transpose()
    }

    fn list_events(&self) -> RepoResult<Vec<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} ORDER BY created_at ASC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }

    fn list_events_by_activity(&self, activity_id: ActivityId) -> RepoResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE activity_id = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([activity_id.to_string()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }

    fn delete_event(&self, id: EventId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM events WHERE id = ?1;", [id.to_string()])?;
        Self::ensure_changed(changed, id)
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let id_text: String = row.get("id")?;
    let activity_text: String = row.get("activity_id")?;
    let values_text: String = row.get("property_values")?;

    Ok(Event {
        id: parse_uuid(&id_text, "events.id")?,
        activity_id: parse_uuid(&activity_text, "events.activity_id")?,
        property_values: decode_json(&values_text, "events.property_values")?,
    })
}
