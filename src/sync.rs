//! Additive directory sync: CRM cohorts and students into the local store.
//!
//! Sync only ever inserts. A cohort or student already mapped by external id
//! is reused as-is, even if its name or cohort changed in the CRM. Cohorts
//! are processed one at a time in the order the CRM returned them; the
//! database lock is taken per write and never held across a CRM call.

use crate::db::{AttendanceDb, DbCohort, DbError, DbStudent};
use crate::directory::{DirectorySource, ExternalCohort, ExternalStudent};
use crate::error::AttendanceError;
use crate::state::AppState;
use crate::types::SyncSummary;

/// Find the local cohort for a CRM cohort, inserting it on first sight.
/// Returns the cohort and whether it was created by this call.
fn ensure_cohort(
    db: &AttendanceDb,
    external_id: &str,
    display_name: &str,
) -> Result<(DbCohort, bool), DbError> {
    if let Some(existing) = db.get_cohort_by_external_id(external_id)? {
        return Ok((existing, false));
    }
    match db.insert_cohort(external_id, display_name) {
        Ok(cohort) => Ok((cohort, true)),
        // Another sync inserted it between our lookup and insert.
        Err(DbError::Conflict(_)) => db
            .get_cohort_by_external_id(external_id)?
            .map(|c| (c, false))
            .ok_or_else(|| DbError::NotFound(format!("cohort with external id {external_id}"))),
        Err(e) => Err(e),
    }
}

/// Insert a CRM student if no local row has its external id.
/// Returns true if a row was inserted.
fn ensure_student(
    db: &AttendanceDb,
    student: &ExternalStudent,
    cohort_id: &str,
) -> Result<bool, DbError> {
    if db.get_student_by_external_id(&student.external_id)?.is_some() {
        return Ok(false);
    }
    match db.insert_student(&student.external_id, &student.name, cohort_id) {
        Ok(_) => Ok(true),
        Err(DbError::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Insert the missing students of one cohort. Returns (inserted, skipped).
fn sync_cohort_students(
    state: &AppState,
    cohort: &DbCohort,
    students: &[ExternalStudent],
) -> (usize, usize) {
    let mut inserted = 0;
    let mut skipped = 0;
    for student in students {
        match state.with_db_ref(|db| ensure_student(db, student, &cohort.id)) {
            Ok(true) => inserted += 1,
            Ok(false) => {}
            Err(e) => {
                log::warn!(
                    "sync: failed to create student {} ({}) in cohort {}: {}",
                    student.name,
                    student.external_id,
                    cohort.external_id,
                    e
                );
                skipped += 1;
            }
        }
    }
    (inserted, skipped)
}

/// Sync every CRM cohort visible on the attendance system, and their students.
///
/// Failing to list cohorts aborts the whole sync with `ExternalService`.
/// After that, failures are per entity: a cohort whose students cannot be
/// fetched, or whose row cannot be created, is logged and skipped, and so is
/// a student whose row cannot be created. Rows written before a failure stay.
pub async fn sync_all(
    state: &AppState,
    directory: &dyn DirectorySource,
) -> Result<SyncSummary, AttendanceError> {
    let cohorts = directory.fetch_cohorts().await?;
    log::info!("sync: {} cohorts in directory", cohorts.len());

    let separator = state.config.display_name_separator.as_str();
    let mut summary = SyncSummary::default();

    for external in &cohorts {
        let display_name = external.display_name(separator);
        let cohort = match state
            .with_db_ref(|db| ensure_cohort(db, &external.external_id, &display_name))
        {
            Ok((cohort, created)) => {
                if created {
                    summary.cohorts_synced += 1;
                }
                cohort
            }
            Err(e) => {
                log::warn!(
                    "sync: failed to create cohort {} ({}): {}",
                    display_name,
                    external.external_id,
                    e
                );
                summary.cohorts_skipped += 1;
                continue;
            }
        };

        // Students are scoped by the CRM cohort id, not the local one.
        let students = match directory.fetch_students(&external.external_id).await {
            Ok(students) => students,
            Err(e) => {
                log::warn!(
                    "sync: failed to fetch students for cohort {} ({}): {}",
                    display_name,
                    external.external_id,
                    e
                );
                summary.cohorts_skipped += 1;
                continue;
            }
        };

        let (inserted, skipped) = sync_cohort_students(state, &cohort, &students);
        summary.students_synced += inserted;
        summary.students_skipped += skipped;
    }

    log::info!("sync: {}", summary.message());
    Ok(summary)
}

/// Make sure a single CRM cohort has a local row. An existing row is
/// returned unchanged; its name is never updated.
pub fn sync_cohort(
    state: &AppState,
    external: &ExternalCohort,
) -> Result<DbCohort, AttendanceError> {
    let display_name = external.display_name(&state.config.display_name_separator);
    let (cohort, created) =
        state.with_db_ref(|db| ensure_cohort(db, &external.external_id, &display_name))?;
    if created {
        log::info!("sync: created cohort {} ({})", cohort.name, cohort.external_id);
    }
    Ok(cohort)
}

/// Sync the students of one already-synced cohort and return its full local
/// roster, sorted by display name.
///
/// The cohort must exist locally (`NotFound` otherwise). A failed CRM call
/// aborts with `ExternalService`; individual insert failures are logged and
/// skipped.
pub async fn sync_students(
    state: &AppState,
    directory: &dyn DirectorySource,
    external_cohort_id: &str,
) -> Result<Vec<DbStudent>, AttendanceError> {
    let cohort = state
        .with_db_ref(|db| db.get_cohort_by_external_id(external_cohort_id))?
        .ok_or_else(|| {
            AttendanceError::NotFound(format!("cohort with external id {external_cohort_id}"))
        })?;

    let students = directory.fetch_students(external_cohort_id).await?;
    let (inserted, skipped) = sync_cohort_students(state, &cohort, &students);
    log::info!(
        "sync: cohort {}: {} new students, {} skipped",
        cohort.external_id,
        inserted,
        skipped
    );

    Ok(state.with_db_ref(|db| db.list_students(&cohort.id))?)
}

/// Local roster for a CRM cohort. A cohort that has not been synced yet has
/// no students rather than being an error.
pub fn students_for_external_cohort(
    state: &AppState,
    external_cohort_id: &str,
) -> Result<Vec<DbStudent>, AttendanceError> {
    match state.with_db_ref(|db| {
        let local_id = db.get_cohort_local_id(external_cohort_id)?;
        db.list_students(&local_id)
    }) {
        Ok(students) => Ok(students),
        Err(DbError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::db::test_utils::test_db;
    use crate::directory::DirectoryError;
    use crate::types::Config;

    #[derive(Default)]
    struct FakeDirectory {
        cohorts: Mutex<Vec<ExternalCohort>>,
        students: Mutex<HashMap<String, Vec<ExternalStudent>>>,
        fail_cohorts: bool,
        fail_students_for: HashSet<String>,
        student_calls: Mutex<Vec<String>>,
    }

    impl FakeDirectory {
        fn with_cohort(self, id: &str, name: &str, course: &str, students: &[(&str, &str)]) -> Self {
            self.cohorts.lock().push(ExternalCohort {
                external_id: id.into(),
                name: name.into(),
                secondary_name: course.into(),
            });
            self.students.lock().insert(
                id.into(),
                students
                    .iter()
                    .map(|(sid, sname)| ExternalStudent {
                        external_id: sid.to_string(),
                        name: sname.to_string(),
                    })
                    .collect(),
            );
            self
        }

        fn rename_student(&self, cohort: &str, student: &str, name: &str) {
            let mut students = self.students.lock();
            for s in students.get_mut(cohort).unwrap().iter_mut() {
                if s.external_id == student {
                    s.name = name.to_string();
                }
            }
        }
    }

    #[async_trait]
    impl DirectorySource for FakeDirectory {
        async fn fetch_cohorts(&self) -> Result<Vec<ExternalCohort>, DirectoryError> {
            if self.fail_cohorts {
                return Err(DirectoryError::Http {
                    status: 502,
                    message: "Bad Gateway".into(),
                });
            }
            Ok(self.cohorts.lock().clone())
        }

        async fn fetch_students(
            &self,
            external_cohort_id: &str,
        ) -> Result<Vec<ExternalStudent>, DirectoryError> {
            self.student_calls.lock().push(external_cohort_id.to_string());
            if self.fail_students_for.contains(external_cohort_id) {
                return Err(DirectoryError::Network("connection reset".into()));
            }
            Ok(self
                .students
                .lock()
                .get(external_cohort_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn state() -> AppState {
        AppState::with_db(Config::default(), test_db())
    }

    #[tokio::test]
    async fn test_sync_twice_is_idempotent() {
        let state = state();
        let dir = FakeDirectory::default().with_cohort(
            "COH1",
            "Cohort 1",
            "",
            &[("S1", "Alice"), ("S2", "Bob")],
        );

        let first = sync_all(&state, &dir).await.unwrap();
        assert_eq!(first.cohorts_synced, 1);
        assert_eq!(first.students_synced, 2);

        let second = sync_all(&state, &dir).await.unwrap();
        assert_eq!(second, SyncSummary::default());
    }

    #[tokio::test]
    async fn test_students_fetched_by_external_cohort_id() {
        let state = state();
        let dir = FakeDirectory::default().with_cohort("COH1", "Cohort 1", "", &[("S1", "Alice")]);
        sync_all(&state, &dir).await.unwrap();

        assert_eq!(*dir.student_calls.lock(), vec!["COH1".to_string()]);
    }

    #[tokio::test]
    async fn test_sync_never_updates_existing_rows() {
        let state = state();
        let dir = FakeDirectory::default().with_cohort("COH1", "Cohort 1", "", &[("S1", "Alice")]);
        sync_all(&state, &dir).await.unwrap();

        dir.rename_student("COH1", "S1", "Alicia");
        dir.cohorts.lock()[0].name = "Renamed".into();
        sync_all(&state, &dir).await.unwrap();

        let cohort = state
            .with_db_ref(|db| db.get_cohort_by_external_id("COH1"))
            .unwrap()
            .unwrap();
        assert_eq!(cohort.name, "Cohort 1");
        let student = state
            .with_db_ref(|db| db.get_student_by_external_id("S1"))
            .unwrap()
            .unwrap();
        assert_eq!(student.name, "Alice");
    }

    #[tokio::test]
    async fn test_student_moved_between_cohorts_is_not_duplicated() {
        let state = state();
        let dir = FakeDirectory::default()
            .with_cohort("COH1", "Cohort 1", "", &[("S1", "Alice")])
            .with_cohort("COH2", "Cohort 2", "", &[("S1", "Alice")]);

        let summary = sync_all(&state, &dir).await.unwrap();
        assert_eq!(summary.cohorts_synced, 2);
        assert_eq!(summary.students_synced, 1);

        let count: i64 = state
            .with_db_ref(|db| {
                Ok(db.conn_ref().query_row(
                    "SELECT COUNT(*) FROM students WHERE external_id = 'S1'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_display_name_composed_from_course() {
        let state = state();
        let dir = FakeDirectory::default().with_cohort("COH1", "Cohort 7", "Full Stack", &[]);
        sync_all(&state, &dir).await.unwrap();

        let cohort = state
            .with_db_ref(|db| db.get_cohort_by_external_id("COH1"))
            .unwrap()
            .unwrap();
        assert_eq!(cohort.name, "Cohort 7 - Full Stack");
    }

    #[tokio::test]
    async fn test_cohort_listing_failure_aborts() {
        let state = state();
        let dir = FakeDirectory {
            fail_cohorts: true,
            ..FakeDirectory::default()
        };
        let err = sync_all(&state, &dir).await.unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::ExternalService { status: Some(502), .. }
        ));
    }

    #[tokio::test]
    async fn test_student_fetch_failure_skips_only_that_cohort() {
        let state = state();
        let mut dir = FakeDirectory::default()
            .with_cohort("COH1", "Cohort 1", "", &[("S1", "Alice")])
            .with_cohort("COH2", "Cohort 2", "", &[("S2", "Bob"), ("S3", "Carol")]);
        dir.fail_students_for.insert("COH1".into());

        let summary = sync_all(&state, &dir).await.unwrap();
        assert_eq!(summary.cohorts_synced, 2, "cohort row is written before its students");
        assert_eq!(summary.cohorts_skipped, 1);
        assert_eq!(summary.students_synced, 2);

        // Next run picks up the students once the CRM answers again.
        dir.fail_students_for.clear();
        let again = sync_all(&state, &dir).await.unwrap();
        assert_eq!(again.cohorts_synced, 0);
        assert_eq!(again.students_synced, 1);
    }

    #[tokio::test]
    async fn test_insert_failures_are_skipped_and_counted() {
        let state = state();
        let dir = FakeDirectory::default()
            .with_cohort("COH1", "Cohort 1", "", &[("S1", "Alice"), ("S2", "Bob")])
            .with_cohort("COH2", "Cohort 2", "", &[("S3", "Carol")])
            .with_cohort("COH3", "Cohort 3", "", &[("S4", "Dan")]);
        state
            .with_db_ref(|db| {
                db.conn_ref().execute_batch(
                    "CREATE TRIGGER reject_coh2 BEFORE INSERT ON cohorts
                     WHEN NEW.external_id = 'COH2'
                     BEGIN SELECT RAISE(ABORT, 'cohort rejected'); END;
                     CREATE TRIGGER reject_s2 BEFORE INSERT ON students
                     WHEN NEW.external_id = 'S2'
                     BEGIN SELECT RAISE(ABORT, 'student rejected'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let summary = sync_all(&state, &dir).await.unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                cohorts_synced: 2,
                students_synced: 2,
                cohorts_skipped: 1,
                students_skipped: 1,
            }
        );

        // A rejected cohort is not asked for its students; later cohorts still sync.
        assert_eq!(
            *dir.student_calls.lock(),
            vec!["COH1".to_string(), "COH3".to_string()]
        );
        assert!(state
            .with_db_ref(|db| db.get_cohort_by_external_id("COH2"))
            .unwrap()
            .is_none());
        let roster = students_for_external_cohort(&state, "COH1").unwrap();
        let names: Vec<&str> = roster.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alice"]);
        assert_eq!(students_for_external_cohort(&state, "COH3").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_students_returns_sorted_roster() {
        let state = state();
        let dir = FakeDirectory::default().with_cohort(
            "COH1",
            "Cohort 1",
            "",
            &[("S2", "Bob"), ("S1", "Alice")],
        );
        let cohort = sync_cohort(&state, &dir.cohorts.lock()[0].clone()).unwrap();
        assert_eq!(cohort.external_id, "COH1");

        let roster = sync_students(&state, &dir, "COH1").await.unwrap();
        let names: Vec<&str> = roster.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn test_sync_students_requires_synced_cohort() {
        let state = state();
        let dir = FakeDirectory::default().with_cohort("COH1", "Cohort 1", "", &[("S1", "Alice")]);
        let err = sync_students(&state, &dir, "COH1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_sync_cohort_keeps_existing_name() {
        let state = state();
        let original = ExternalCohort {
            external_id: "COH1".into(),
            name: "Cohort 1".into(),
            secondary_name: String::new(),
        };
        let first = sync_cohort(&state, &original).unwrap();
        let renamed = ExternalCohort {
            name: "Other".into(),
            ..original
        };
        let second = sync_cohort(&state, &renamed).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Cohort 1");
    }

    #[test]
    fn test_unsynced_cohort_has_no_students() {
        let state = state();
        assert!(students_for_external_cohort(&state, "COH404").unwrap().is_empty());
    }
}
