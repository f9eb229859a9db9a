use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::*;

fn map_attendance(row: &Row<'_>) -> rusqlite::Result<DbAttendance> {
    Ok(DbAttendance {
        id: row.get(0)?,
        lesson_id: row.get(1)?,
        student_id: row.get(2)?,
        attended: row.get(3)?,
        note: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

const SELECT_ATTENDANCE: &str =
    "SELECT id, lesson_id, student_id, attended, note, updated_at FROM attendance";

impl AttendanceDb {
    // =========================================================================
    // Attendance
    // =========================================================================

    /// Attendance rows for the given lessons. An empty lesson set returns
    /// an empty list without touching the database.
    pub fn list_attendance(&self, lesson_ids: &[String]) -> Result<Vec<DbAttendance>, DbError> {
        if lesson_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; lesson_ids.len()].join(", ");
        let sql = format!("{SELECT_ATTENDANCE} WHERE lesson_id IN ({placeholders})");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(lesson_ids.iter()), map_attendance)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn get_attendance(
        &self,
        lesson_id: &str,
        student_id: &str,
    ) -> Result<Option<DbAttendance>, DbError> {
        let record = self
            .conn
            .query_row(
                &format!("{SELECT_ATTENDANCE} WHERE lesson_id = ?1 AND student_id = ?2"),
                params![lesson_id, student_id],
                map_attendance,
            )
            .optional()?;
        Ok(record)
    }

    /// Write a single attendance mark immediately (unbuffered path).
    ///
    /// Updates the existing row for (lesson, student) in place, or inserts
    /// one if the pair has never been marked.
    pub fn upsert_attendance(
        &self,
        lesson_id: &str,
        student_id: &str,
        attended: bool,
        note: Option<&str>,
    ) -> Result<DbAttendance, DbError> {
        let now = now_rfc3339();
        match self.get_attendance(lesson_id, student_id)? {
            Some(existing) => {
                self.conn.execute(
                    "UPDATE attendance SET attended = ?1, note = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![attended, note, now, existing.id],
                )?;
                Ok(DbAttendance {
                    attended,
                    note: note.map(str::to_string),
                    updated_at: now,
                    ..existing
                })
            }
            None => {
                let record = DbAttendance {
                    id: new_id(),
                    lesson_id: lesson_id.to_string(),
                    student_id: student_id.to_string(),
                    attended,
                    note: note.map(str::to_string),
                    updated_at: now,
                };
                self.conn.execute(
                    "INSERT INTO attendance (id, lesson_id, student_id, attended, note, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.id,
                        record.lesson_id,
                        record.student_id,
                        record.attended,
                        record.note,
                        record.updated_at,
                    ],
                )?;
                Ok(record)
            }
        }
    }

    /// Write many attendance marks as one atomic batch.
    ///
    /// Conflicts on (lesson_id, student_id) replace attended, note, and
    /// updated_at. Any failing entry rolls the whole batch back. An empty
    /// batch is a no-op.
    pub fn bulk_upsert_attendance(
        &self,
        entries: &[AttendanceEntry],
    ) -> Result<Vec<DbAttendance>, DbError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let now = now_rfc3339();
        self.with_transaction(|db| {
            let mut stmt = db.conn.prepare_cached(
                "INSERT INTO attendance (id, lesson_id, student_id, attended, note, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(lesson_id, student_id) DO UPDATE SET
                    attended = excluded.attended,
                    note = excluded.note,
                    updated_at = excluded.updated_at",
            )?;
            for entry in entries {
                stmt.execute(params![
                    new_id(),
                    entry.lesson_id,
                    entry.student_id,
                    entry.attended,
                    entry.note,
                    now,
                ])?;
            }

            let mut records = Vec::with_capacity(entries.len());
            for entry in entries {
                if let Some(record) = db.get_attendance(&entry.lesson_id, &entry.student_id)? {
                    records.push(record);
                }
            }
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{seed_cohort, test_db};
    use super::*;

    fn entry(lesson: &str, student: &str, attended: bool, note: Option<&str>) -> AttendanceEntry {
        AttendanceEntry {
            lesson_id: lesson.to_string(),
            student_id: student.to_string(),
            attended,
            note: note.map(str::to_string),
        }
    }

    #[test]
    fn test_list_attendance_empty_input() {
        let db = test_db();
        assert!(db.list_attendance(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let db = test_db();
        let (_, students, lessons) = seed_cohort(&db, "C1", &[("S1", "Alice")], &["2025-01-05"]);
        let (l, s) = (&lessons[0].id, &students[0].id);

        let first = db.upsert_attendance(l, s, true, Some("late")).unwrap();
        let second = db.upsert_attendance(l, s, false, None).unwrap();
        assert_eq!(first.id, second.id);

        let rows = db.list_attendance(&[l.clone()]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].attended);
        assert_eq!(rows[0].note, None);
    }

    #[test]
    fn test_bulk_upsert_inserts_and_replaces() {
        let db = test_db();
        let (_, students, lessons) = seed_cohort(
            &db,
            "C1",
            &[("S1", "Alice"), ("S2", "Bob")],
            &["2025-01-05"],
        );
        let l = &lessons[0].id;
        let original = db.upsert_attendance(l, &students[0].id, false, None).unwrap();

        let written = db
            .bulk_upsert_attendance(&[
                entry(l, &students[0].id, true, Some("back from sick leave")),
                entry(l, &students[1].id, true, None),
            ])
            .unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].id, original.id, "conflict must update the existing row");
        assert!(written[0].attended);
        assert_eq!(written[0].note.as_deref(), Some("back from sick leave"));

        assert_eq!(db.list_attendance(&[l.clone()]).unwrap().len(), 2);
    }

    #[test]
    fn test_bulk_upsert_empty_is_noop() {
        let db = test_db();
        assert!(db.bulk_upsert_attendance(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_upsert_failure_writes_nothing() {
        let db = test_db();
        let (_, students, lessons) = seed_cohort(&db, "C1", &[("S1", "Alice")], &["2025-01-05"]);
        let l = &lessons[0].id;

        let result = db.bulk_upsert_attendance(&[
            entry(l, &students[0].id, true, None),
            entry("deleted-lesson", &students[0].id, true, None),
        ]);
        assert!(result.is_err());
        assert!(db.list_attendance(&[l.clone()]).unwrap().is_empty());
    }
}
