//! Optimistic attendance buffer.
//!
//! Edits to the attendance grid land here first and are shown immediately;
//! nothing is written until [`AttendanceBuffer::flush`] sends the whole
//! pending set as one batch. Every read of the grid goes through the layered
//! lookup `pending ?? server ?? absent`, implemented by [`effective`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::{AttendanceDb, AttendanceEntry, DbAttendance};
use crate::error::AttendanceError;

/// Composite (lesson, student) key. Compared field by field, so no choice of
/// identifier can make two different pairs collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingKey {
    pub lesson_id: String,
    pub student_id: String,
}

impl PendingKey {
    pub fn new(lesson_id: &str, student_id: &str) -> Self {
        Self {
            lesson_id: lesson_id.to_string(),
            student_id: student_id.to_string(),
        }
    }
}

/// An unsaved edit. `note: None` means the note was not touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub attended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// What the grid shows for one (lesson, student) cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCell {
    pub attended: bool,
    pub note: String,
}

/// Persisted attendance indexed by key. A missing entry is "absent, no note".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerView {
    cells: HashMap<PendingKey, AttendanceCell>,
}

impl ServerView {
    pub fn from_records(records: &[DbAttendance]) -> Self {
        let cells = records
            .iter()
            .map(|r| {
                (
                    PendingKey::new(&r.lesson_id, &r.student_id),
                    AttendanceCell {
                        attended: r.attended,
                        note: r.note.clone().unwrap_or_default(),
                    },
                )
            })
            .collect();
        Self { cells }
    }

    pub fn get(&self, key: &PendingKey) -> Option<&AttendanceCell> {
        self.cells.get(key)
    }

    /// Record entries the store has accepted, so reads match the store
    /// without a round trip.
    pub fn apply(&mut self, entries: &[AttendanceEntry]) {
        for entry in entries {
            self.cells.insert(
                PendingKey::new(&entry.lesson_id, &entry.student_id),
                AttendanceCell {
                    attended: entry.attended,
                    note: entry.note.clone().unwrap_or_default(),
                },
            );
        }
    }
}

/// Layered read for one cell: the pending edit wins over the server value,
/// which wins over the default. A pending edit that never touched the note
/// keeps the server note.
pub fn effective(
    pending: &HashMap<PendingKey, PendingChange>,
    server: &ServerView,
    key: &PendingKey,
) -> AttendanceCell {
    let base = server.get(key).cloned().unwrap_or_default();
    match pending.get(key) {
        Some(change) => AttendanceCell {
            attended: change.attended,
            note: change.note.clone().unwrap_or(base.note),
        },
        None => base,
    }
}

/// In-memory staging area for attendance edits of one cohort.
#[derive(Debug, Default)]
pub struct AttendanceBuffer {
    pending: HashMap<PendingKey, PendingChange>,
}

impl AttendanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an attended flag, keeping any note already staged for the cell.
    pub fn set_attended(&mut self, lesson_id: &str, student_id: &str, attended: bool) {
        self.pending
            .entry(PendingKey::new(lesson_id, student_id))
            .and_modify(|c| c.attended = attended)
            .or_insert(PendingChange {
                attended,
                note: None,
            });
    }

    /// Stage a note, keeping any attended flag already staged for the cell.
    /// A cell with nothing staged takes its attended flag from what is
    /// currently visible (server value, else absent).
    pub fn set_note(&mut self, lesson_id: &str, student_id: &str, note: &str, server: &ServerView) {
        let key = PendingKey::new(lesson_id, student_id);
        let visible_attended = server.get(&key).map(|c| c.attended).unwrap_or(false);
        self.pending
            .entry(key)
            .and_modify(|c| c.note = Some(note.to_string()))
            .or_insert(PendingChange {
                attended: visible_attended,
                note: Some(note.to_string()),
            });
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn get(&self, key: &PendingKey) -> Option<&PendingChange> {
        self.pending.get(key)
    }

    /// The cell as the grid should show it.
    pub fn effective(&self, server: &ServerView, key: &PendingKey) -> AttendanceCell {
        effective(&self.pending, server, key)
    }

    /// Effective cells for every (lesson, student) pair of the grid.
    pub fn effective_view(
        &self,
        server: &ServerView,
        lesson_ids: &[String],
        student_ids: &[String],
    ) -> HashMap<PendingKey, AttendanceCell> {
        let mut view = HashMap::with_capacity(lesson_ids.len() * student_ids.len());
        for lesson_id in lesson_ids {
            for student_id in student_ids {
                let key = PendingKey::new(lesson_id, student_id);
                let cell = effective(&self.pending, server, &key);
                view.insert(key, cell);
            }
        }
        view
    }

    /// The pending set as upsert entries, in key order. Untouched notes are
    /// filled from the server so saving never erases a visible note.
    pub fn entries(&self, server: &ServerView) -> Vec<AttendanceEntry> {
        let mut keys: Vec<&PendingKey> = self.pending.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|key| {
                let cell = effective(&self.pending, server, key);
                AttendanceEntry {
                    lesson_id: key.lesson_id.clone(),
                    student_id: key.student_id.clone(),
                    attended: cell.attended,
                    note: Some(cell.note).filter(|n| !n.is_empty()),
                }
            })
            .collect()
    }

    /// Persist every pending edit as one batch.
    ///
    /// The buffer is cleared only after the store accepted the whole batch;
    /// on error it is left exactly as it was so the save can be retried.
    pub fn flush(&mut self, db: &AttendanceDb, server: &ServerView) -> Result<usize, AttendanceError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let entries = self.entries(server);
        match db.bulk_upsert_attendance(&entries) {
            Ok(_) => {
                let flushed = entries.len();
                self.pending.clear();
                log::info!("attendance: flushed {} pending changes", flushed);
                Ok(flushed)
            }
            Err(e) => {
                log::error!(
                    "attendance: flush of {} pending changes failed: {}",
                    entries.len(),
                    e
                );
                Err(e.into())
            }
        }
    }

    /// Drop every pending edit. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
