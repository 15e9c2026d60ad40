//! Users as the store knows them: an id and a login.

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{Store, now_us};
use crate::error::{ProjectError, Result};
use crate::model::function::User;
use crate::model::ids::UserId;
use crate::model::validation::{MSG_BLANK, MSG_TAKEN, ValidationErrors};

const FIELD_LOGIN: &str = "login";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        login: row.get(1)?,
    })
}

pub(crate) fn get_user_in(conn: &Connection, id: UserId) -> Result<User> {
    conn.query_row(
        "SELECT user_id, login FROM users WHERE user_id = ?1",
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| ProjectError::not_found(UserId::KIND, id.get()))
}

impl Store {
    /// Register a user. Logins are trimmed and must be unique.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::Invalid`] on a blank or taken login.
    pub fn create_user(&self, login: &str) -> Result<User> {
        let login = login.trim();
        let mut errors = ValidationErrors::new();
        if login.is_empty() {
            errors.add(FIELD_LOGIN, MSG_BLANK);
        } else if self.find_user_by_login(login)?.is_some() {
            errors.add(FIELD_LOGIN, MSG_TAKEN);
        }
        errors.into_result().map_err(ProjectError::Invalid)?;

        self.connection().execute(
            "INSERT INTO users (login, created_at_us) VALUES (?1, ?2)",
            params![login, now_us()],
        )?;
        let id = UserId(self.connection().last_insert_rowid());
        tracing::info!(user_id = %id, login, "user created");
        Ok(User {
            id,
            login: login.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such user exists.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        get_user_in(self.connection(), id)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_user_by_login(&self, login: &str) -> Result<Option<User>> {
        Ok(self
            .connection()
            .query_row(
                "SELECT user_id, login FROM users WHERE login = ?1",
                [login.trim()],
                user_from_row,
            )
            .optional()?)
    }

    /// All users ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT user_id, login FROM users ORDER BY user_id")?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }
}
