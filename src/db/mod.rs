//! SQLite-backed local store for cohorts, students, lessons, and attendance.
//!
//! The database lives at `~/.rollcall/rollcall.db` unless the config points
//! elsewhere. Cohorts and students are mirrored from the CRM directory by the
//! sync engine and are never rewritten here; lessons and attendance are owned
//! by this store. Deleting a lesson relies on the `ON DELETE CASCADE` foreign
//! key to drop its attendance rows, so `foreign_keys` is always switched on.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

mod attendance;
mod cohorts;
mod lessons;
mod students;

pub mod types;
pub use types::*;

pub struct AttendanceDb {
    conn: Connection,
}

impl AttendanceDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok. Rolls back if the closure or the commit fails, so the
    /// connection is never left inside an open transaction.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = f(self).and_then(|val| {
            self.conn.execute_batch("COMMIT")?;
            Ok(val)
        });
        if let Err(e) = &result {
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback failed after {}: {}", e, rollback_err);
                }
            }
        }
        result
    }

    /// Open (or create) the database at the configured path, or at
    /// `~/.rollcall/rollcall.db` when none is configured, and apply the schema.
    pub fn open(configured: Option<&Path>) -> Result<Self, DbError> {
        let path = match configured {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        // Lesson deletion depends on the attendance cascade.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.rollcall/rollcall.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".rollcall").join("rollcall.db"))
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
