use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Row};

use super::*;
use crate::util::{format_date, parse_date};

fn map_lesson(row: &Row<'_>) -> rusqlite::Result<DbLesson> {
    let raw_date: String = row.get(2)?;
    let lesson_date = parse_date(&raw_date)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    Ok(DbLesson {
        id: row.get(0)?,
        cohort_id: row.get(1)?,
        lesson_date,
        created_at: row.get(3)?,
    })
}

impl AttendanceDb {
    // =========================================================================
    // Lessons
    // =========================================================================

    /// Lessons of a cohort, newest date first.
    pub fn list_lessons(&self, cohort_id: &str) -> Result<Vec<DbLesson>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, cohort_id, lesson_date, created_at
             FROM lessons WHERE cohort_id = ?1
             ORDER BY lesson_date DESC",
        )?;
        let rows = stmt.query_map(params![cohort_id], map_lesson)?;

        let mut lessons = Vec::new();
        for row in rows {
            lessons.push(row?);
        }
        Ok(lessons)
    }

    /// Create a lesson. A second lesson for the same (cohort, date) fails
    /// with `Conflict`.
    pub fn create_lesson(&self, cohort_id: &str, date: NaiveDate) -> Result<DbLesson, DbError> {
        let lesson = DbLesson {
            id: new_id(),
            cohort_id: cohort_id.to_string(),
            lesson_date: date,
            created_at: now_rfc3339(),
        };
        self.conn.execute(
            "INSERT INTO lessons (id, cohort_id, lesson_date, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                lesson.id,
                lesson.cohort_id,
                format_date(lesson.lesson_date),
                lesson.created_at,
            ],
        )?;
        Ok(lesson)
    }

    /// Create several lessons as one unit: either every date is created or
    /// none is.
    pub fn create_lessons(
        &self,
        cohort_id: &str,
        dates: &[NaiveDate],
    ) -> Result<Vec<DbLesson>, DbError> {
        if dates.is_empty() {
            return Ok(Vec::new());
        }
        self.with_transaction(|db| {
            dates
                .iter()
                .map(|date| db.create_lesson(cohort_id, *date))
                .collect()
        })
    }

    /// Move a lesson to another date.
    pub fn update_lesson(&self, lesson_id: &str, date: NaiveDate) -> Result<DbLesson, DbError> {
        let changed = self.conn.execute(
            "UPDATE lessons SET lesson_date = ?1 WHERE id = ?2",
            params![format_date(date), lesson_id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(format!("lesson {lesson_id}")));
        }
        let lesson = self.conn.query_row(
            "SELECT id, cohort_id, lesson_date, created_at FROM lessons WHERE id = ?1",
            params![lesson_id],
            map_lesson,
        )?;
        Ok(lesson)
    }

    /// Delete a lesson. Its attendance rows go with it through the
    /// `ON DELETE CASCADE` foreign key.
    pub fn delete_lesson(&self, lesson_id: &str) -> Result<(), DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM lessons WHERE id = ?1", params![lesson_id])?;
        if removed == 0 {
            return Err(DbError::NotFound(format!("lesson {lesson_id}")));
        }
        Ok(())
    }
}
