//! Command handlers. Each submodule owns its clap args and a `run_*` entry
//! point taking the shared [`Context`].

pub mod events;
pub mod function;
pub mod init;
pub mod member;
pub mod milestone;
pub mod project;
pub mod tags;
pub mod ticket;
pub mod user;

use anyhow::{Context as _, Result};
use milepost_core::config::{EffectiveConfig, store_path};
use milepost_core::db::Store;
use milepost_core::model::function::{Function, User};
use milepost_core::model::ids::{FunctionId, ProjectId};
use milepost_core::model::project::Project;
use milepost_core::{AccessFacts, ErrorCode, ProjectError};
use std::fmt;
use std::path::PathBuf;

use crate::output::OutputMode;

/// A refusal decided by the CLI itself, carrying a stable code.
#[derive(Debug)]
pub struct Refused {
    pub code: ErrorCode,
    pub message: String,
}

impl Refused {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Refused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Refused {}

/// Everything a command needs besides its own args.
pub struct Context {
    pub root: PathBuf,
    pub config: EffectiveConfig,
    pub output: OutputMode,
}

impl Context {
    /// Open the store under the project root. Refuses when `mp init` has not
    /// run yet.
    pub fn open_store(&self) -> Result<Store> {
        let path = store_path(&self.root);
        if !path.exists() {
            return Err(Refused::new(
                ErrorCode::NotInitialized,
                format!("no store at {}", path.display()),
            )
            .into());
        }
        Store::open(&path, &self.config.project.store)
    }

    /// The acting user named by `--as`, `MILEPOST_USER`, or the user config.
    pub fn actor(&self, store: &Store) -> Result<Option<User>> {
        let Some(login) = self.config.resolved_actor.as_deref() else {
            return Ok(None);
        };
        let user = store
            .find_user_by_login(login)?
            .ok_or_else(|| Refused::new(ErrorCode::NotFound, format!("unknown user '{login}'")))?;
        Ok(Some(user))
    }

    pub fn require_actor(&self, store: &Store) -> Result<User> {
        self.actor(store)?.ok_or_else(|| {
            Refused::new(
                ErrorCode::MissingActor,
                "this command needs an acting user (--as <login> or MILEPOST_USER)",
            )
            .into()
        })
    }

    fn is_global_admin(&self, actor: Option<&User>) -> bool {
        self.config
            .project
            .access
            .grants_global_admin(actor.map(|user| user.login.as_str()))
    }

    pub fn global_access(&self, actor: Option<&User>) -> AccessFacts {
        AccessFacts {
            global_admin: self.is_global_admin(actor),
            project_admin: false,
        }
    }

    pub fn project_access(&self, project: &Project, actor: Option<&User>) -> AccessFacts {
        AccessFacts::for_project(
            project,
            actor.map(|user| user.id),
            self.is_global_admin(actor),
        )
    }
}

/// Resolve a project by numeric id or by name. A numeric key that matches
/// no id is tried as a name.
pub fn resolve_project(store: &Store, key: &str) -> Result<Project> {
    if let Ok(raw) = key.parse::<i64>() {
        match store.load_project(ProjectId(raw)) {
            Ok(project) => return Ok(project),
            Err(ProjectError::NotFound { .. }) => {}
            Err(err) => return Err(err).with_context(|| format!("load project {raw}")),
        }
    }
    store.find_project_by_name(key)?.ok_or_else(|| {
        Refused::new(ErrorCode::NotFound, format!("project '{key}' not found")).into()
    })
}

/// Resolve a function by numeric id or by name.
pub fn resolve_function(store: &Store, key: &str) -> Result<Function> {
    if let Ok(raw) = key.parse::<i64>() {
        return Ok(store.get_function(FunctionId(raw))?);
    }
    store
        .list_functions()?
        .into_iter()
        .find(|function| function.name == key)
        .ok_or_else(|| {
            Refused::new(ErrorCode::NotFound, format!("function '{key}' not found")).into()
        })
}

/// Resolve a user by login.
pub fn resolve_user(store: &Store, login: &str) -> Result<User> {
    store.find_user_by_login(login)?.ok_or_else(|| {
        Refused::new(ErrorCode::NotFound, format!("user '{login}' not found")).into()
    })
}

/// Format microseconds since the epoch for humans.
pub fn format_us(us: i64) -> String {
    chrono::DateTime::from_timestamp_micros(us).map_or_else(
        || us.to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
