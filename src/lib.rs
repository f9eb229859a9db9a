//! Attendance tracking for cohort-based courses.
//!
//! Cohorts and students come from the CRM directory through an additive sync
//! ([`sync`]); lessons and attendance live in the local SQLite store
//! ([`db`]). Attendance edits are staged in an optimistic buffer
//! ([`buffer`], owned by a [`session::AttendanceSession`]) and saved in one
//! batch.

pub mod buffer;
pub mod db;
pub mod directory;
pub mod error;
mod migrations;
pub mod session;
pub mod state;
pub mod stats;
pub mod sync;
pub mod types;
pub mod util;

pub use error::{AttendanceError, ErrorReport};
pub use state::AppState;
pub use types::{Config, SyncSummary};
