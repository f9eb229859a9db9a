use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::util::collation_key;

fn map_student(row: &Row<'_>) -> rusqlite::Result<DbStudent> {
    Ok(DbStudent {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        cohort_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl AttendanceDb {
    // =========================================================================
    // Students
    // =========================================================================

    /// Look up a student by CRM identifier, across all cohorts.
    pub fn get_student_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<DbStudent>, DbError> {
        let student = self
            .conn
            .query_row(
                "SELECT id, external_id, name, cohort_id, created_at
                 FROM students WHERE external_id = ?1",
                params![external_id],
                map_student,
            )
            .optional()?;
        Ok(student)
    }

    /// Insert a student first seen in the CRM. The external identifier is
    /// unique across the whole table; a second insert fails with `Conflict`.
    pub fn insert_student(
        &self,
        external_id: &str,
        name: &str,
        cohort_id: &str,
    ) -> Result<DbStudent, DbError> {
        let student = DbStudent {
            id: new_id(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            cohort_id: cohort_id.to_string(),
            created_at: now_rfc3339(),
        };
        self.conn.execute(
            "INSERT INTO students (id, external_id, name, cohort_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                student.id,
                student.external_id,
                student.name,
                student.cohort_id,
                student.created_at,
            ],
        )?;
        Ok(student)
    }

    /// Students of a cohort, ordered by display name with locale-aware
    /// comparison (see [`collation_key`]).
    pub fn list_students(&self, cohort_id: &str) -> Result<Vec<DbStudent>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, external_id, name, cohort_id, created_at
             FROM students WHERE cohort_id = ?1",
        )?;
        let rows = stmt.query_map(params![cohort_id], map_student)?;

        let mut students = Vec::new();
        for row in rows {
            students.push(row?);
        }
        students.sort_by_cached_key(|s| collation_key(&s.name));
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    #[test]
    fn test_list_students_scoped_and_sorted() {
        let db = test_db();
        let c1 = db.insert_cohort("C1", "One").unwrap();
        let c2 = db.insert_cohort("C2", "Two").unwrap();
        db.insert_student("S3", "רותם", &c1.id).unwrap();
        db.insert_student("S1", "אורי", &c1.id).unwrap();
        db.insert_student("S2", "בני", &c2.id).unwrap();

        let names: Vec<String> = db
            .list_students(&c1.id)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["אורי", "רותם"]);
    }

    #[test]
    fn test_student_external_id_unique_across_cohorts() {
        let db = test_db();
        let c1 = db.insert_cohort("C1", "One").unwrap();
        let c2 = db.insert_cohort("C2", "Two").unwrap();
        db.insert_student("S1", "Alice", &c1.id).unwrap();

        let err = db.insert_student("S1", "Alice", &c2.id).unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn test_student_requires_existing_cohort() {
        let db = test_db();
        assert!(db.insert_student("S1", "Alice", "no-such-cohort").is_err());
    }
}
