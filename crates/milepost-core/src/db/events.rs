//! The audit trail.
//!
//! Events are appended by the project save path in the same transaction as
//! the write they describe, so a rolled-back save leaves no event behind.

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Store, now_us};
use crate::error::{ProjectError, Result};
use crate::model::event::{EVENTABLE_PROJECT, Event, EventType};
use crate::model::ids::{EventId, ProjectId, UserId};

const SELECT_EVENT: &str = "SELECT event_id, project_id, user_id, event_type, \
                            eventable_type, eventable_id, created_at_us FROM events";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let raw_type: String = row.get(3)?;
    let event_type = raw_type.parse::<EventType>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(Event {
        id: row.get(0)?,
        project_id: row.get(1)?,
        user_id: row.get(2)?,
        event_type,
        eventable_type: row.get(4)?,
        eventable_id: row.get(5)?,
        created_at_us: row.get(6)?,
    })
}

/// Append a project lifecycle event attributed to `actor`.
pub(crate) fn record_project_event(
    conn: &Connection,
    project_id: ProjectId,
    actor: UserId,
    event_type: EventType,
) -> Result<EventId> {
    conn.execute(
        "INSERT INTO events \
         (project_id, user_id, event_type, eventable_type, eventable_id, created_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?1, ?5)",
        params![
            project_id,
            actor,
            event_type.as_str(),
            EVENTABLE_PROJECT,
            now_us()
        ],
    )?;
    let id = EventId(conn.last_insert_rowid());
    tracing::debug!(event_id = %id, project_id = %project_id, user_id = %actor, %event_type, "event recorded");
    Ok(id)
}

impl Store {
    /// Events for a project, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_events(&self, project_id: ProjectId) -> Result<Vec<Event>> {
        let mut stmt = self.connection().prepare(&format!(
            "{SELECT_EVENT} WHERE project_id = ?1 ORDER BY created_at_us DESC, event_id DESC"
        ))?;
        let events = stmt
            .query_map([project_id], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// The most recent event for a project, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_event(&self, project_id: ProjectId) -> Result<Option<Event>> {
        Ok(self
            .connection()
            .query_row(
                &format!(
                    "{SELECT_EVENT} WHERE project_id = ?1 \
                     ORDER BY created_at_us DESC, event_id DESC LIMIT 1"
                ),
                [project_id],
                event_from_row,
            )
            .optional()?)
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such event exists.
    pub fn get_event(&self, id: EventId) -> Result<Event> {
        self.connection()
            .query_row(
                &format!("{SELECT_EVENT} WHERE event_id = ?1"),
                [id],
                event_from_row,
            )
            .optional()?
            .ok_or_else(|| ProjectError::not_found(EventId::KIND, id.get()))
    }
}
