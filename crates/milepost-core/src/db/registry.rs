//! The function registry: role definitions shared by every project.
//!
//! "The" admin role is whichever admin-flagged function has the lowest id;
//! likewise for the non-admin role. Nothing stops several functions carrying
//! the same flag. [`Store::set_admin_flags`] is the one operation that
//! rewrites flags, and it does so under the registry-wide exclusive lock so
//! that a concurrent reassignment never observes a half-rewritten set.

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{BTreeMap, BTreeSet};

use super::{Store, now_us};
use crate::error::{ProjectError, Result};
use crate::lock::LockMode;
use crate::model::function::Function;
use crate::model::ids::FunctionId;
use crate::model::validation::{FIELD_NAME, MSG_BLANK, MSG_TAKEN, ValidationErrors};

const SELECT_FUNCTION: &str = "SELECT function_id, name, is_admin FROM functions";

fn function_from_row(row: &Row<'_>) -> rusqlite::Result<Function> {
    Ok(Function {
        id: row.get(0)?,
        name: row.get(1)?,
        is_admin: row.get(2)?,
    })
}

pub(crate) fn get_function_in(conn: &Connection, id: FunctionId) -> Result<Function> {
    conn.query_row(
        &format!("{SELECT_FUNCTION} WHERE function_id = ?1"),
        [id],
        function_from_row,
    )
    .optional()?
    .ok_or_else(|| ProjectError::not_found(FunctionId::KIND, id.get()))
}

pub(crate) fn first_with_flag(conn: &Connection, is_admin: bool) -> Result<Option<Function>> {
    Ok(conn
        .query_row(
            &format!("{SELECT_FUNCTION} WHERE is_admin = ?1 ORDER BY function_id LIMIT 1"),
            [is_admin],
            function_from_row,
        )
        .optional()?)
}

pub(crate) fn functions_by_id(conn: &Connection) -> Result<BTreeMap<FunctionId, Function>> {
    let mut stmt = conn.prepare(&format!("{SELECT_FUNCTION} ORDER BY function_id"))?;
    let rows = stmt.query_map([], function_from_row)?;

    let mut functions = BTreeMap::new();
    for row in rows {
        let function = row?;
        functions.insert(function.id, function);
    }
    Ok(functions)
}

fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Function>> {
    Ok(conn
        .query_row(
            &format!("{SELECT_FUNCTION} WHERE name = ?1"),
            [name],
            function_from_row,
        )
        .optional()?)
}

fn insert_function(conn: &Connection, name: &str, is_admin: bool) -> Result<Function> {
    let now = now_us();
    conn.execute(
        "INSERT INTO functions (name, is_admin, created_at_us, updated_at_us) \
         VALUES (?1, ?2, ?3, ?3)",
        params![name, is_admin, now],
    )?;
    Ok(Function {
        id: FunctionId(conn.last_insert_rowid()),
        name: name.to_string(),
        is_admin,
    })
}

impl Store {
    /// Add a role to the registry. Names are trimmed, required, and unique.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectError::Invalid`] keyed on `name` for a blank or taken
    /// name.
    pub fn create_function(&self, name: &str, is_admin: bool) -> Result<Function> {
        let name = name.trim();
        let mut errors = ValidationErrors::new();
        if name.is_empty() {
            errors.add(FIELD_NAME, MSG_BLANK);
        } else if find_by_name(self.connection(), name)?.is_some() {
            errors.add(FIELD_NAME, MSG_TAKEN);
        }
        errors.into_result().map_err(ProjectError::Invalid)?;

        let function = insert_function(self.connection(), name, is_admin)?;
        tracing::info!(function_id = %function.id, name, is_admin, "function created");
        Ok(function)
    }

    /// Make sure an admin role named `admin_name` and a non-admin role named
    /// `member_name` exist. Existing rows are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or written.
    pub fn seed_default_functions(
        &mut self,
        admin_name: &str,
        member_name: &str,
    ) -> Result<(Function, Function)> {
        let tx = self.write_tx()?;
        let admin = match find_by_name(&tx, admin_name.trim())? {
            Some(existing) => existing,
            None => insert_function(&tx, admin_name.trim(), true)?,
        };
        let member = match find_by_name(&tx, member_name.trim())? {
            Some(existing) => existing,
            None => insert_function(&tx, member_name.trim(), false)?,
        };
        tx.commit()?;
        tracing::debug!(admin = %admin.name, member = %member.name, "default functions seeded");
        Ok((admin, member))
    }

    /// # Errors
    ///
    /// Returns [`ProjectError::NotFound`] if no such function exists.
    pub fn get_function(&self, id: FunctionId) -> Result<Function> {
        get_function_in(self.connection(), id)
    }

    /// All functions ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_functions(&self) -> Result<Vec<Function>> {
        Ok(functions_by_id(self.connection())?.into_values().collect())
    }

    /// The first admin-flagged function, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn lookup_default_admin(&self) -> Result<Option<Function>> {
        first_with_flag(self.connection(), true)
    }

    /// The first function without the admin flag, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn lookup_default_non_admin(&self) -> Result<Option<Function>> {
        first_with_flag(self.connection(), false)
    }

    /// Flag exactly the functions in `admin_ids` as admin and clear the flag
    /// everywhere else. Ids that match no function are ignored.
    ///
    /// Returns the number of functions whose flag changed.
    ///
    /// Member rows keep their old denormalized `is_admin` copy until their
    /// project is next saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock cannot be taken or the rewrite
    /// fails; in that case no flag changes.
    pub fn set_admin_flags(&mut self, admin_ids: &BTreeSet<FunctionId>) -> Result<usize> {
        let _guard = self.registry_lock(LockMode::Exclusive)?;
        let tx = self.write_tx()?;

        let now = now_us();
        let mut changed = 0;
        for function in functions_by_id(&tx)?.into_values() {
            let is_admin = admin_ids.contains(&function.id);
            if function.is_admin == is_admin {
                continue;
            }
            tx.execute(
                "UPDATE functions SET is_admin = ?2, updated_at_us = ?3 WHERE function_id = ?1",
                params![function.id, is_admin, now],
            )?;
            changed += 1;
        }
        tx.commit()?;

        tracing::info!(changed, admins = admin_ids.len(), "admin flags rewritten");
        Ok(changed)
    }
}
