//! Tickets and their tags.
//!
//! Every tag write recomputes the owning project's `tag_counts` in the same
//! transaction, so the derived map never lags the tickets it summarizes.

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeSet;

use super::projects::{ensure_project_in, issue_ticket_number, recompute_tags_in};
use super::{Store, now_us};
use crate::error::{ProjectError, Result};
use crate::model::ids::{ProjectId, TicketId};
use crate::model::ticket::{Ticket, normalize_tags};
use crate::model::validation::{MSG_BLANK, ValidationErrors};

const FIELD_TITLE: &str = "title";

const SELECT_TICKET: &str = "SELECT ticket_id, project_id, number, title FROM tickets";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        project_id: row.get(1)?,
        number: row.get(2)?,
        title: row.get(3)?,
        tags: BTreeSet::new(),
    })
}

fn load_tags(conn: &Connection, ticket_id: TicketId) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM ticket_tags WHERE ticket_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map([ticket_id], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(tags)
}

fn write_tags(conn: &Connection, ticket_id: TicketId, tags: &BTreeSet<String>) -> Result<()> {
    conn.execute("DELETE FROM ticket_tags WHERE ticket_id = ?1", [ticket_id])?;
    let mut stmt = conn.prepare("INSERT INTO ticket_tags (ticket_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![ticket_id, tag])?;
    }
    Ok(())
}

fn get_ticket_in(conn: &Connection, id: TicketId) -> Result<Ticket> {
    let mut ticket = conn
        .query_row(
            &format!("{SELECT_TICKET} WHERE ticket_id = ?1"),
            [id],
            ticket_from_row,
        )
        .optional()?
        .ok_or_else(|| ProjectError::not_found(TicketId::KIND, id.get()))?;
    ticket.tags = load_tags(conn, id)?;
    Ok(ticket)
}

impl Store {
    /// Open a ticket: issue its number, store its tags, and refresh the
    /// project's tag counts, all in one transaction.
    ///
    /// # Errors
    ///
    /// [`ProjectError::NotFound`] for an unknown project,
    /// [`ProjectError::Invalid`] keyed on `title` for a blank title.
    pub fn create_ticket<I, S>(&mut self, project_id: ProjectId, title: &str, tags: I) -> Result<Ticket>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let title = title.trim();
        let tags = normalize_tags(tags);

        let tx = self.write_tx()?;
        ensure_project_in(&tx, project_id)?;

        let mut errors = ValidationErrors::new();
        if title.is_empty() {
            errors.add(FIELD_TITLE, MSG_BLANK);
        }
        errors.into_result().map_err(ProjectError::Invalid)?;

        let number = issue_ticket_number(&tx, project_id)?;
        let now = now_us();
        tx.execute(
            "INSERT INTO tickets (project_id, number, title, created_at_us, updated_at_us) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![project_id, number, title, now],
        )?;
        let id = TicketId(tx.last_insert_rowid());
        write_tags(&tx, id, &tags)?;
        recompute_tags_in(&tx, project_id)?;
        tx.commit()?;

        tracing::info!(project_id = %project_id, ticket_id = %id, number, tags = tags.len(), "ticket created");
        Ok(Ticket {
            id,
            project_id,
            number,
            title: title.to_string(),
            tags,
        })
    }

    /// Replace a ticket's tag set and refresh the project's tag counts.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such ticket exists.
    pub fn set_ticket_tags<I, S>(&mut self, ticket_id: TicketId, tags: I) -> Result<Ticket>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = normalize_tags(tags);

        let tx = self.write_tx()?;
        let mut ticket = get_ticket_in(&tx, ticket_id)?;
        write_tags(&tx, ticket_id, &tags)?;
        tx.execute(
            "UPDATE tickets SET updated_at_us = ?2 WHERE ticket_id = ?1",
            params![ticket_id, now_us()],
        )?;
        recompute_tags_in(&tx, ticket.project_id)?;
        tx.commit()?;

        tracing::debug!(ticket_id = %ticket_id, tags = tags.len(), "ticket tags replaced");
        ticket.tags = tags;
        Ok(ticket)
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such ticket exists.
    pub fn get_ticket(&self, id: TicketId) -> Result<Ticket> {
        get_ticket_in(self.connection(), id)
    }

    /// A project's tickets ordered by number.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_tickets(&self, project_id: ProjectId) -> Result<Vec<Ticket>> {
        let mut stmt = self
            .connection()
            .prepare(&format!("{SELECT_TICKET} WHERE project_id = ?1 ORDER BY number"))?;
        let mut tickets = stmt
            .query_map([project_id], ticket_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for ticket in &mut tickets {
            ticket.tags = load_tags(self.connection(), ticket.id)?;
        }
        Ok(tickets)
    }
}
