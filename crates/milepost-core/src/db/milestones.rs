//! Milestone storage. Classification lives in [`crate::model::milestone`].

use rusqlite::{Row, params};

use super::projects::ensure_project_in;
use super::{Store, now_us};
use crate::error::{ProjectError, Result};
use crate::model::ids::{MilestoneId, ProjectId};
use crate::model::milestone::{Milestone, MilestonePlan};
use crate::model::validation::{FIELD_NAME, MSG_BLANK, ValidationErrors};

fn milestone_from_row(row: &Row<'_>) -> rusqlite::Result<Milestone> {
    Ok(Milestone {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        expected_at_us: row.get(3)?,
    })
}

impl Store {
    /// Add a milestone to a project. `expected_at_us` may be absent.
    ///
    /// # Errors
    ///
    /// [`ProjectError::NotFound`] for an unknown project,
    /// [`ProjectError::Invalid`] keyed on `name` for a blank name.
    pub fn create_milestone(
        &mut self,
        project_id: ProjectId,
        name: &str,
        expected_at_us: Option<i64>,
    ) -> Result<Milestone> {
        let name = name.trim();
        let tx = self.write_tx()?;
        ensure_project_in(&tx, project_id)?;

        let mut errors = ValidationErrors::new();
        if name.is_empty() {
            errors.add(FIELD_NAME, MSG_BLANK);
        }
        errors.into_result().map_err(ProjectError::Invalid)?;

        tx.execute(
            "INSERT INTO milestones (project_id, name, expected_at_us, created_at_us) \
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, name, expected_at_us, now_us()],
        )?;
        let id = MilestoneId(tx.last_insert_rowid());
        tx.commit()?;

        tracing::info!(project_id = %project_id, milestone_id = %id, name, "milestone created");
        Ok(Milestone {
            id,
            project_id,
            name: name.to_string(),
            expected_at_us,
        })
    }

    /// A project's milestones in stored (insertion) order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_milestones(&self, project_id: ProjectId) -> Result<Vec<Milestone>> {
        let mut stmt = self.connection().prepare(
            "SELECT milestone_id, project_id, name, expected_at_us \
             FROM milestones WHERE project_id = ?1 ORDER BY milestone_id",
        )?;
        let milestones = stmt
            .query_map([project_id], milestone_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(milestones)
    }

    /// Classify a project's milestones around `now_us`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such project exists.
    pub fn milestone_plan(&self, project_id: ProjectId, now_us: i64) -> Result<MilestonePlan> {
        ensure_project_in(self.connection(), project_id)?;
        let milestones = self.list_milestones(project_id)?;
        Ok(MilestonePlan::classify(&milestones, now_us))
    }
}
