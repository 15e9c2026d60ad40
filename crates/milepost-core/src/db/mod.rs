//! SQLite store for projects, the function registry, and their children.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers do not block the single writer
//! - `busy_timeout` (default 5s) to ride out short write contention
//! - `foreign_keys = ON` so project deletion cascades to owned rows
//!
//! Every mutation runs inside an `IMMEDIATE` transaction, which takes the
//! SQLite write lock up front. That serializes read-modify-write cycles on a
//! project across connections.

pub mod events;
pub mod migrations;
pub mod milestones;
pub mod projects;
pub mod registry;
pub mod schema;
pub mod tickets;
pub mod users;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::StoreConfig;
use crate::lock::{LockError, LockMode, RegistryLock};

/// Name of the registry lock file, next to the database.
pub const REGISTRY_LOCK_FILE: &str = "registry.lock";

/// Open (or create) the store database, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store_db(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open store database {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(())
}

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// A handle on the store. One handle is one writer; open several handles
/// (or processes) for concurrency and let SQLite serialize them.
pub struct Store {
    conn: Connection,
    lock_path: Option<PathBuf>,
    lock_timeout: Duration,
}

impl Store {
    /// Open a file-backed store. The registry lock lives next to the
    /// database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        let conn = open_store_db(path, config.busy_timeout())?;
        let lock_path = path
            .parent()
            .map(|dir| dir.join(REGISTRY_LOCK_FILE));
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self {
            conn,
            lock_path,
            lock_timeout: config.lock_timeout(),
        })
    }

    /// Open a private in-memory store. There is no registry lock file;
    /// transactions alone serialize writers on the single connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self {
            conn,
            lock_path: None,
            lock_timeout: StoreConfig::default().lock_timeout(),
        })
    }

    /// Read access to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the registry lock file, if this store has one.
    #[must_use]
    pub fn lock_path(&self) -> Option<&Path> {
        self.lock_path.as_deref()
    }

    pub(crate) fn registry_lock(&self, mode: LockMode) -> Result<Option<RegistryLock>, LockError> {
        self.lock_path
            .as_deref()
            .map(|path| RegistryLock::acquire(path, self.lock_timeout, mode))
            .transpose()
    }

    pub(crate) fn write_tx(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
    }
}
