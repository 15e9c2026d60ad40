//! Persistence for the project aggregate.
//!
//! Every write goes through [`persist`]: refresh denormalized member fields,
//! run the four invariants in one pass, write the root row and the member
//! list, then append the audit event. All of it happens in one `IMMEDIATE`
//! transaction, so a failed validation or a failed event insert leaves
//! nothing behind.
//!
//! `num_ticket` and `tag_counts` are owned by their dedicated operations
//! ([`Store::next_ticket_number`], [`Store::recompute_tag_counts`]). A regular
//! save never writes them; it reloads them instead.

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{BTreeMap, BTreeSet, btree_map::Entry};

use super::events::record_project_event;
use super::registry::{first_with_flag, functions_by_id};
use super::schema::PROJECT_OWNED_TABLES;
use super::users::get_user_in;
use super::{Store, now_us};
use crate::error::{ProjectError, Result};
use crate::lock::LockMode;
use crate::model::event::EventType;
use crate::model::function::User;
use crate::model::ids::{FunctionId, MemberId, ProjectId, TicketId, UserId};
use crate::model::project::{
    Project, ProjectAttributes, ProjectChanges, ProjectMember, ReassignOutcome,
    ReassignRejection, normalize_member,
};
use crate::model::ticket::tally_tags;

const SELECT_PROJECT: &str = "SELECT project_id, name, description, num_ticket, \
                              tag_counts_json, created_at_us, updated_at_us FROM projects";

/// Rows removed alongside a destroyed project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DestroyReport {
    pub members: usize,
    pub milestones: usize,
    pub tickets: usize,
    pub events: usize,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<(Project, String)> {
    let mut project = Project::new(ProjectAttributes {
        name: row.get(1)?,
        description: row.get(2)?,
    });
    project.id = Some(row.get(0)?);
    project.num_ticket = row.get(3)?;
    project.created_at_us = row.get(5)?;
    project.updated_at_us = row.get(6)?;
    Ok((project, row.get(4)?))
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectMember> {
    Ok(ProjectMember {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        function_id: row.get(3)?,
        function_name: row.get(4)?,
        is_admin: row.get(5)?,
    })
}

fn load_members(conn: &Connection, project_id: ProjectId) -> Result<Vec<ProjectMember>> {
    let mut stmt = conn.prepare(
        "SELECT member_id, user_id, user_name, function_id, function_name, is_admin \
         FROM project_members WHERE project_id = ?1 ORDER BY position",
    )?;
    let members = stmt
        .query_map([project_id], member_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(members)
}

fn hydrate(conn: &Connection, (mut project, tag_json): (Project, String)) -> Result<Project> {
    project.tag_counts = serde_json::from_str(&tag_json)?;
    if let Some(id) = project.id {
        project.members = load_members(conn, id)?;
    }
    Ok(project)
}

pub(crate) fn load_project_in(conn: &Connection, id: ProjectId) -> Result<Project> {
    let row = conn
        .query_row(
            &format!("{SELECT_PROJECT} WHERE project_id = ?1"),
            [id],
            project_from_row,
        )
        .optional()?
        .ok_or_else(|| ProjectError::not_found(ProjectId::KIND, id.get()))?;
    hydrate(conn, row)
}

/// Fail with `NotFound` unless the project row exists.
pub(crate) fn ensure_project_in(conn: &Connection, id: ProjectId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE project_id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(ProjectError::not_found(ProjectId::KIND, id.get()))
    }
}

// ---------------------------------------------------------------------------
// Save path
// ---------------------------------------------------------------------------

fn name_taken(conn: &Connection, name: &str, id: Option<ProjectId>) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM projects
            WHERE name = ?1 AND (?2 IS NULL OR project_id <> ?2)
        )",
        params![name, id],
        |row| row.get(0),
    )?)
}

/// Refresh every member's denormalized fields from the rows it references.
fn normalize_members(conn: &Connection, project: &mut Project) -> Result<()> {
    let functions = functions_by_id(conn)?;
    let mut users: BTreeMap<UserId, User> = BTreeMap::new();

    for member in &mut project.members {
        let function = functions
            .get(&member.function_id)
            .ok_or_else(|| ProjectError::not_found(FunctionId::KIND, member.function_id.get()))?;
        let user = match users.entry(member.user_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(get_user_in(conn, member.user_id)?),
        };
        *member = normalize_member(member, function, user);
    }
    Ok(())
}

fn write_members(conn: &Connection, project_id: ProjectId, members: &[ProjectMember]) -> Result<()> {
    conn.execute(
        "DELETE FROM project_members WHERE project_id = ?1",
        [project_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO project_members \
         (project_id, member_id, position, user_id, user_name, function_id, function_name, is_admin) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for (position, member) in members.iter().enumerate() {
        stmt.execute(params![
            project_id,
            member.id,
            i64::try_from(position).unwrap_or(i64::MAX),
            member.user_id,
            member.user_name,
            member.function_id,
            member.function_name,
            member.is_admin,
        ])?;
    }
    Ok(())
}

fn reload_derived(conn: &Connection, project: &mut Project, id: ProjectId) -> Result<()> {
    let (num_ticket, tag_json): (Option<i64>, String) = conn.query_row(
        "SELECT num_ticket, tag_counts_json FROM projects WHERE project_id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    project.num_ticket = num_ticket;
    project.tag_counts = serde_json::from_str(&tag_json)?;
    Ok(())
}

/// Normalize, validate, write, and log one project inside the caller's
/// transaction.
fn persist(conn: &Connection, project: &mut Project) -> Result<()> {
    let creating = project.is_new();
    if creating && project.actor_on_create().is_none() {
        return Err(ProjectError::MissingActor);
    }

    normalize_members(conn, project)?;

    let errors = project.validate(name_taken(conn, &project.name, project.id)?);
    if !errors.is_empty() {
        tracing::warn!(project = %project.name, %errors, "project rejected by validation");
        return Err(ProjectError::Invalid(errors));
    }

    let now = now_us();
    let id = if let Some(id) = project.id {
        let rows = conn.execute(
            "UPDATE projects SET name = ?2, description = ?3, updated_at_us = ?4 \
             WHERE project_id = ?1",
            params![id, project.name, project.description, now],
        )?;
        if rows == 0 {
            return Err(ProjectError::not_found(ProjectId::KIND, id.get()));
        }
        id
    } else {
        conn.execute(
            "INSERT INTO projects (name, description, created_at_us, updated_at_us) \
             VALUES (?1, ?2, ?3, ?3)",
            params![project.name, project.description, now],
        )?;
        project.created_at_us = now;
        ProjectId(conn.last_insert_rowid())
    };
    project.id = Some(id);
    project.updated_at_us = now;

    write_members(conn, id, &project.members)?;
    reload_derived(conn, project, id)?;

    if creating {
        let actor = project.actor_on_create().ok_or(ProjectError::MissingActor)?;
        record_project_event(conn, id, actor, EventType::Created)?;
    } else if let Some(actor) = project.actor_on_update() {
        record_project_event(conn, id, actor, EventType::Updated)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Counters and derived state
// ---------------------------------------------------------------------------

/// Atomically bump the project's counter and return the number to assign.
pub(crate) fn issue_ticket_number(conn: &Connection, project_id: ProjectId) -> Result<i64> {
    conn.query_row(
        "UPDATE projects \
         SET num_ticket = COALESCE(num_ticket, 1) + 1, updated_at_us = ?2 \
         WHERE project_id = ?1 \
         RETURNING num_ticket - 1",
        params![project_id, now_us()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| ProjectError::not_found(ProjectId::KIND, project_id.get()))
}

/// Rebuild `tag_counts` from every ticket of the project and store it.
pub(crate) fn recompute_tags_in(
    conn: &Connection,
    project_id: ProjectId,
) -> Result<BTreeMap<String, u64>> {
    ensure_project_in(conn, project_id)?;

    let mut stmt = conn.prepare(
        "SELECT t.ticket_id, tt.tag \
         FROM tickets t JOIN ticket_tags tt ON tt.ticket_id = t.ticket_id \
         WHERE t.project_id = ?1",
    )?;
    let rows = stmt.query_map([project_id], |row| {
        Ok((row.get::<_, TicketId>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut tag_sets: BTreeMap<TicketId, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        let (ticket_id, tag) = row?;
        tag_sets.entry(ticket_id).or_default().insert(tag);
    }
    let counts = tally_tags(tag_sets.values());

    conn.execute(
        "UPDATE projects SET tag_counts_json = ?2, updated_at_us = ?3 WHERE project_id = ?1",
        params![project_id, serde_json::to_string(&counts)?, now_us()],
    )?;
    tracing::debug!(project_id = %project_id, distinct = counts.len(), "tag counts recomputed");
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Store API
// ---------------------------------------------------------------------------

impl Store {
    /// Create a project whose founding member is `founding_user`, holding
    /// the registry's default admin function. Logs a `created` event.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::MissingActor`] when no founding user is given;
    ///   nothing is written.
    /// - [`ProjectError::NoAdminFunction`] when the registry has no
    ///   admin-flagged function.
    /// - [`ProjectError::Invalid`] when validation fails.
    pub fn create_project(
        &mut self,
        attributes: ProjectAttributes,
        founding_user: Option<UserId>,
    ) -> Result<Project> {
        let founder = founding_user.ok_or(ProjectError::MissingActor)?;

        let tx = self.write_tx()?;
        let founder = get_user_in(&tx, founder)?;
        let admin = first_with_flag(&tx, true)?.ok_or(ProjectError::NoAdminFunction)?;

        let mut project = Project::new_with_admin_member(attributes, &founder, &admin);
        persist(&tx, &mut project)?;
        tx.commit()?;

        project.clear_actors();
        tracing::info!(
            project_id = ?project.id,
            name = %project.name,
            founder = %founder.login,
            "project created"
        );
        Ok(project)
    }

    /// Persist `project`, inserting it if new.
    ///
    /// The transient actors set on the project decide which event is
    /// logged; both are cleared after a successful save. On failure
    /// `project` is left exactly as it was passed in.
    ///
    /// # Errors
    ///
    /// [`ProjectError::Invalid`] with per-field messages when an invariant
    /// fails, [`ProjectError::MissingActor`] when inserting without a
    /// creator, [`ProjectError::NotFound`] for dangling user or function
    /// references.
    pub fn save_project(&mut self, project: &mut Project) -> Result<()> {
        let mut working = project.clone();
        let tx = self.write_tx()?;
        persist(&tx, &mut working)?;
        tx.commit()?;

        working.clear_actors();
        *project = working;
        tracing::debug!(project_id = ?project.id, "project saved");
        Ok(())
    }

    /// Apply `changes`, attribute them to `actor`, and save. An `updated`
    /// event is logged only when `actor` is given.
    ///
    /// On failure the in-memory project keeps the attempted changes; the
    /// stored row is untouched.
    ///
    /// # Errors
    ///
    /// Same as [`Store::save_project`].
    pub fn update_project(
        &mut self,
        project: &mut Project,
        changes: ProjectChanges,
        actor: Option<UserId>,
    ) -> Result<()> {
        project.apply_changes(changes);
        project.set_actor_on_update(actor);
        self.save_project(project)
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such project exists.
    pub fn load_project(&self, id: ProjectId) -> Result<Project> {
        load_project_in(self.connection(), id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let row = self
            .connection()
            .query_row(
                &format!("{SELECT_PROJECT} WHERE name = ?1"),
                [name],
                project_from_row,
            )
            .optional()?;
        row.map(|row| hydrate(self.connection(), row)).transpose()
    }

    /// All projects ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .connection()
            .prepare(&format!("{SELECT_PROJECT} ORDER BY name"))?;
        let rows = stmt
            .query_map([], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|row| hydrate(self.connection(), row))
            .collect()
    }

    /// Delete a project together with its members, milestones, tickets,
    /// ticket tags, and events.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such project exists.
    pub fn destroy_project(&mut self, id: ProjectId) -> Result<DestroyReport> {
        let tx = self.write_tx()?;
        ensure_project_in(&tx, id)?;

        let mut counts = [0usize; 4];
        for (slot, table) in counts.iter_mut().zip(PROJECT_OWNED_TABLES) {
            let count: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE project_id = ?1"),
                [id],
                |row| row.get(0),
            )?;
            *slot = usize::try_from(count).unwrap_or(usize::MAX);
        }

        tx.execute("DELETE FROM projects WHERE project_id = ?1", [id])?;
        tx.commit()?;

        let [members, milestones, tickets, events] = counts;
        let report = DestroyReport {
            members,
            milestones,
            tickets,
            events,
        };
        tracing::info!(project_id = %id, ?report, "project destroyed");
        Ok(report)
    }

    /// Add `user_id` to the project with `function_id` and save.
    ///
    /// Returns `false` without writing when the user is already a member.
    /// When `actor` is given the save logs an `updated` event.
    ///
    /// # Errors
    ///
    /// [`ProjectError::NotFound`] for an unknown project, user, or function.
    pub fn add_member(
        &mut self,
        project_id: ProjectId,
        user_id: UserId,
        function_id: FunctionId,
        actor: Option<UserId>,
    ) -> Result<bool> {
        let tx = self.write_tx()?;
        let mut project = load_project_in(&tx, project_id)?;
        let user = get_user_in(&tx, user_id)?;
        let function = super::registry::get_function_in(&tx, function_id)?;

        if !project.add_member(&user, &function) {
            tracing::debug!(project_id = %project_id, user_id = %user_id, "already a member");
            return Ok(false);
        }
        project.set_actor_on_update(actor);
        persist(&tx, &mut project)?;
        tx.commit()?;

        tracing::info!(
            project_id = %project_id,
            user = %user.login,
            function = %function.name,
            "member added"
        );
        Ok(true)
    }

    /// Move members to new functions, all at once or not at all.
    ///
    /// The batch is refused up front unless at least one target function is
    /// admin-flagged, and when any member or function id does not resolve.
    /// A batch that passes those checks can still be refused by save-time
    /// validation, e.g. when it demotes the last admin member. Runs under
    /// the shared registry lock so admin flags stay put meanwhile.
    ///
    /// # Errors
    ///
    /// Refusals are reported in the [`ReassignOutcome`]. Errors are reserved
    /// for an unknown project, lock timeouts, and storage failures.
    pub fn reassign_functions(
        &mut self,
        project_id: ProjectId,
        assignments: &BTreeMap<MemberId, FunctionId>,
        actor: Option<UserId>,
    ) -> Result<ReassignOutcome> {
        let _guard = self.registry_lock(LockMode::Shared)?;
        let tx = self.write_tx()?;

        let mut project = load_project_in(&tx, project_id)?;
        let registry = functions_by_id(&tx)?;

        if let Err(rejection) = project.check_reassignment(assignments, &registry) {
            tracing::warn!(project_id = %project_id, %rejection, "reassignment refused");
            return Ok(ReassignOutcome::Rejected { rejection });
        }

        project.apply_reassignment(assignments);
        project.set_actor_on_update(actor);
        match persist(&tx, &mut project) {
            Ok(()) => {}
            Err(ProjectError::Invalid(errors)) => {
                let rejection = ReassignRejection::Invalid { errors };
                tracing::warn!(project_id = %project_id, %rejection, "reassignment refused");
                return Ok(ReassignOutcome::Rejected { rejection });
            }
            Err(err) => return Err(err),
        }
        tx.commit()?;

        tracing::info!(project_id = %project_id, assigned = assignments.len(), "functions reassigned");
        Ok(ReassignOutcome::Applied)
    }

    /// Issue the next ticket number for a project.
    ///
    /// Returns the current counter (1 when unset) and stores counter + 1, in
    /// a single statement, so concurrent callers never share a number. No
    /// event is logged.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such project exists.
    pub fn next_ticket_number(&self, project_id: ProjectId) -> Result<i64> {
        let number = issue_ticket_number(self.connection(), project_id)?;
        tracing::debug!(project_id = %project_id, number, "ticket number issued");
        Ok(number)
    }

    /// Recount tags across all of the project's tickets and replace
    /// `tag_counts` with the result. No event is logged.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such project exists.
    pub fn recompute_tag_counts(&mut self, project_id: ProjectId) -> Result<BTreeMap<String, u64>> {
        let tx = self.write_tx()?;
        let counts = recompute_tags_in(&tx, project_id)?;
        tx.commit()?;
        Ok(counts)
    }
}
