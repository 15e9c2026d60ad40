//! Authorization facts.
//!
//! The core never decides who is an admin. Adapters work that out (from
//! config, from the member list) and hand the answers in as [`AccessFacts`];
//! operations that need a gate call the `ensure_*` checks before writing.

use serde::{Deserialize, Serialize};

use crate::error::{ProjectError, Result};
use crate::model::ids::UserId;
use crate::model::project::Project;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessFacts {
    /// The caller administers every project.
    pub global_admin: bool,
    /// The caller holds an admin function in the project at hand.
    pub project_admin: bool,
}

impl AccessFacts {
    /// Facts for `actor` against `project`, given whether the operator
    /// configured them as a global admin.
    #[must_use]
    pub fn for_project(project: &Project, actor: Option<UserId>, global_admin: bool) -> Self {
        let project_admin = actor
            .and_then(|user_id| project.membership_of(user_id))
            .is_some_and(|member| member.is_admin);
        Self {
            global_admin,
            project_admin,
        }
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::Unauthorized`] unless the caller is a global
    /// admin.
    pub const fn ensure_global_admin(&self) -> Result<()> {
        if self.global_admin {
            Ok(())
        } else {
            Err(ProjectError::Unauthorized("global admin required"))
        }
    }

    /// Global admins pass as well.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::Unauthorized`] unless the caller administers
    /// the project.
    pub const fn ensure_project_admin(&self) -> Result<()> {
        if self.global_admin || self.project_admin {
            Ok(())
        } else {
            Err(ProjectError::Unauthorized("project admin required"))
        }
    }
}
