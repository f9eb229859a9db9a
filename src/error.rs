//! Error types for sync and attendance operations
//!
//! Errors are classified by how the UI reports them:
//! - ExternalService: the CRM directory is unreachable or refused the query
//! - Conflict: a uniqueness rule in the local store rejected the write
//! - NotFound: the record has not been synced or created yet
//! - Generic: everything else, shown as a localized generic failure

use thiserror::Error;

use crate::db::DbError;
use crate::directory::DirectoryError;

/// Application-level error surfaced to callers of the sync engine,
/// the gateway façade, and the attendance buffer.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("External directory error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ExternalService { status: Option<u16>, message: String },

    #[error("Record already exists: {0}")]
    RecordConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AttendanceError {
    /// Returns true if the local store rejected a write as a duplicate.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AttendanceError::RecordConflict(_))
    }

    /// Returns true if the lookup found nothing. Callers usually treat this
    /// as "not synced yet" and fall back to an empty collection.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AttendanceError::NotFound(_))
    }

    /// Toast text in the UI language.
    pub fn user_message(&self) -> &'static str {
        match self {
            AttendanceError::ExternalService { .. } => "הסנכרון נכשל: לא ניתן להתחבר למערכת ה-CRM",
            AttendanceError::RecordConflict(_) => "הרשומה כבר קיימת",
            AttendanceError::NotFound(_) => "הרשומה לא נמצאה",
            AttendanceError::Database(_) => "אירעה שגיאה בשמירת הנתונים",
            AttendanceError::Configuration(_) => "שגיאת הגדרות המערכת",
            AttendanceError::InvalidInput(_) => "הנתונים שהוזנו אינם תקינים",
        }
    }

    fn error_type(&self) -> ErrorType {
        match self {
            AttendanceError::ExternalService { .. } => ErrorType::ExternalService,
            AttendanceError::RecordConflict(_) => ErrorType::Conflict,
            AttendanceError::NotFound(_) => ErrorType::NotFound,
            _ => ErrorType::Generic,
        }
    }
}

impl From<DbError> for AttendanceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(msg) => AttendanceError::RecordConflict(msg),
            DbError::NotFound(msg) => AttendanceError::NotFound(msg),
            other @ (DbError::HomeDirNotFound | DbError::CreateDir(_)) => {
                AttendanceError::Configuration(other.to_string())
            }
            other => AttendanceError::Database(other.to_string()),
        }
    }
}

impl From<DirectoryError> for AttendanceError {
    fn from(err: DirectoryError) -> Self {
        let status = match &err {
            DirectoryError::Http { status, .. } => Some(*status),
            _ => None,
        };
        AttendanceError::ExternalService {
            status,
            message: err.to_string(),
        }
    }
}

/// Serializable error representation for the UI boundary
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub error_type: ErrorType,
    pub user_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    ExternalService,
    Conflict,
    NotFound,
    Generic,
}

impl From<&AttendanceError> for ErrorReport {
    fn from(err: &AttendanceError) -> Self {
        ErrorReport {
            message: err.to_string(),
            error_type: err.error_type(),
            user_message: err.user_message().to_string(),
        }
    }
}
