//! Shared type definitions for the database layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Uniqueness violation: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Database unavailable")]
    Unavailable,
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, ref msg) = err {
            if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return DbError::Conflict(
                    msg.clone().unwrap_or_else(|| "UNIQUE constraint failed".to_string()),
                );
            }
        }
        DbError::Sqlite(err)
    }
}

/// A row from the `cohorts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCohort {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub created_at: String,
}

/// A row from the `students` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStudent {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub cohort_id: String,
    pub created_at: String,
}

/// A row from the `lessons` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbLesson {
    pub id: String,
    pub cohort_id: String,
    pub lesson_date: NaiveDate,
    pub created_at: String,
}

/// A row from the `attendance` table.
///
/// A missing row for a (lesson, student) pair means "absent, no note".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAttendance {
    pub id: String,
    pub lesson_id: String,
    pub student_id: String,
    pub attended: bool,
    pub note: Option<String>,
    pub updated_at: String,
}

/// One write for `bulk_upsert_attendance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub lesson_id: String,
    pub student_id: String,
    pub attended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
