//! Attendance view session.
//!
//! One session exists per open attendance view. It owns the active cohort,
//! the selected-date filter, the last loaded server snapshot, and the
//! pending-edit buffer. Switching cohort tears all of that down.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::buffer::{AttendanceBuffer, AttendanceCell, PendingKey, ServerView};
use crate::db::{DbLesson, DbStudent};
use crate::error::AttendanceError;
use crate::state::AppState;

/// Everything the attendance grid renders for one cohort.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSheet {
    pub students: Vec<DbStudent>,
    /// Lessons in view after the date filter, newest first.
    pub lessons: Vec<DbLesson>,
    /// Effective cells for every (lesson, student) pair in view.
    #[serde(skip)]
    pub cells: HashMap<PendingKey, AttendanceCell>,
    pub has_pending: bool,
}

pub struct AttendanceSession {
    cohort_id: String,
    selected_dates: BTreeSet<NaiveDate>,
    students: Vec<DbStudent>,
    lessons: Vec<DbLesson>,
    server: ServerView,
    buffer: AttendanceBuffer,
}

impl AttendanceSession {
    /// Open a session on a local cohort. Nothing is loaded until [`load`](Self::load).
    pub fn new(cohort_id: &str) -> Self {
        Self {
            cohort_id: cohort_id.to_string(),
            selected_dates: BTreeSet::new(),
            students: Vec::new(),
            lessons: Vec::new(),
            server: ServerView::default(),
            buffer: AttendanceBuffer::new(),
        }
    }

    pub fn cohort_id(&self) -> &str {
        &self.cohort_id
    }

    /// Move to another cohort. Pending edits, the date filter, and the
    /// loaded snapshot are all dropped. Returns the number of unsaved edits
    /// that were discarded; check [`has_pending`](Self::has_pending) first
    /// to warn before switching.
    pub fn switch_cohort(&mut self, cohort_id: &str) -> usize {
        let discarded = self.buffer.discard();
        if discarded > 0 {
            log::warn!(
                "attendance: switching from cohort {} to {} discarded {} unsaved changes",
                self.cohort_id,
                cohort_id,
                discarded
            );
        }
        *self = Self::new(cohort_id);
        discarded
    }

    /// Reload students, lessons, and attendance for the active cohort.
    /// Pending edits are kept and keep overriding the fresh server values.
    pub fn load(&mut self, state: &AppState) -> Result<(), AttendanceError> {
        let (students, lessons, records) = state.with_db_ref(|db| {
            let students = db.list_students(&self.cohort_id)?;
            let lessons = db.list_lessons(&self.cohort_id)?;
            let lesson_ids: Vec<String> = lessons.iter().map(|l| l.id.clone()).collect();
            let records = db.list_attendance(&lesson_ids)?;
            Ok((students, lessons, records))
        })?;
        self.students = students;
        self.lessons = lessons;
        self.server = ServerView::from_records(&records);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Date filter
    // -------------------------------------------------------------------------

    pub fn toggle_date(&mut self, date: NaiveDate) {
        if !self.selected_dates.remove(&date) {
            self.selected_dates.insert(date);
        }
    }

    pub fn set_selected_dates(&mut self, dates: impl IntoIterator<Item = NaiveDate>) {
        self.selected_dates = dates.into_iter().collect();
    }

    pub fn clear_selected_dates(&mut self) {
        self.selected_dates.clear();
    }

    pub fn selected_dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.selected_dates.iter()
    }

    /// Lessons whose date is selected; all lessons when nothing is selected.
    pub fn visible_lessons(&self) -> Vec<DbLesson> {
        if self.selected_dates.is_empty() {
            return self.lessons.clone();
        }
        self.lessons
            .iter()
            .filter(|l| self.selected_dates.contains(&l.lesson_date))
            .cloned()
            .collect()
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    pub fn set_attended(&mut self, lesson_id: &str, student_id: &str, attended: bool) {
        self.buffer.set_attended(lesson_id, student_id, attended);
    }

    pub fn set_note(&mut self, lesson_id: &str, student_id: &str, note: &str) {
        self.buffer.set_note(lesson_id, student_id, note, &self.server);
    }

    pub fn has_pending(&self) -> bool {
        self.buffer.has_pending()
    }

    pub fn cell(&self, lesson_id: &str, student_id: &str) -> AttendanceCell {
        self.buffer
            .effective(&self.server, &PendingKey::new(lesson_id, student_id))
    }

    /// The grid as it should be rendered right now.
    pub fn sheet(&self) -> AttendanceSheet {
        let lessons = self.visible_lessons();
        let lesson_ids: Vec<String> = lessons.iter().map(|l| l.id.clone()).collect();
        let student_ids: Vec<String> = self.students.iter().map(|s| s.id.clone()).collect();
        AttendanceSheet {
            cells: self
                .buffer
                .effective_view(&self.server, &lesson_ids, &student_ids),
            students: self.students.clone(),
            lessons,
            has_pending: self.buffer.has_pending(),
        }
    }

    /// Save all pending edits as one batch, then reload so the grid shows
    /// what the store holds. On failure the pending edits stay in place.
    ///
    /// Once the batch has committed the save counts as successful. The
    /// written values are folded into the snapshot first, so a failed reload
    /// leaves the grid showing them rather than the pre-save state.
    pub fn save(&mut self, state: &AppState) -> Result<usize, AttendanceError> {
        let staged = self.buffer.entries(&self.server);
        let flushed = {
            let guard = state.db.lock();
            let db = guard
                .as_ref()
                .ok_or_else(|| AttendanceError::from(crate::db::DbError::Unavailable))?;
            self.buffer.flush(db, &self.server).map_err(|e| {
                log::error!(
                    "attendance: save failed for cohort {}: {}",
                    self.cohort_id,
                    e
                );
                e
            })?
        };
        if flushed == 0 {
            return Ok(0);
        }

        self.server.apply(&staged);
        if let Err(e) = self.load(state) {
            log::warn!(
                "attendance: saved {} changes for cohort {} but reload failed: {}",
                flushed,
                self.cohort_id,
                e
            );
        }
        Ok(flushed)
    }

    // -------------------------------------------------------------------------
    // Lessons
    // -------------------------------------------------------------------------

    /// Create one lesson per date for the active cohort, all or nothing.
    /// Repeated dates in the request are rejected before anything is written.
    pub fn create_lessons(
        &mut self,
        state: &AppState,
        dates: &[NaiveDate],
    ) -> Result<Vec<DbLesson>, AttendanceError> {
        if dates.is_empty() {
            return Err(AttendanceError::InvalidInput("no lesson dates given".into()));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = dates.iter().find(|d| !seen.insert(**d)) {
            return Err(AttendanceError::InvalidInput(format!(
                "date {dup} appears more than once"
            )));
        }

        let created = state.with_db_ref(|db| db.create_lessons(&self.cohort_id, dates))?;
        self.load(state)?;
        Ok(created)
    }

    pub fn update_lesson(
        &mut self,
        state: &AppState,
        lesson_id: &str,
        date: NaiveDate,
    ) -> Result<DbLesson, AttendanceError> {
        let lesson = state.with_db_ref(|db| db.update_lesson(lesson_id, date))?;
        self.load(state)?;
        Ok(lesson)
    }

    /// Delete a lesson and, through the store's cascade, its attendance.
    pub fn delete_lesson(&mut self, state: &AppState, lesson_id: &str) -> Result<(), AttendanceError> {
        state.with_db_ref(|db| db.delete_lesson(lesson_id))?;
        self.load(state)?;
        Ok(())
    }
}
