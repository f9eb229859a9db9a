//! Embedded schema migrations.
//!
//! The applied version lives in SQLite's `user_version` header field. Each
//! migration and its version bump commit in the same transaction, so a
//! failed upgrade leaves the file at the previous version.

use rusqlite::Connection;

const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("migrations/001_baseline.sql"))];

fn schema_version(conn: &Connection) -> Result<i32, String> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| format!("Failed to read schema version: {e}"))
}

/// Bring the schema up to the newest embedded version.
/// Returns how many migrations were applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[(i32, &str)]) -> Result<usize, String> {
    let current = schema_version(conn)?;
    let latest = migrations.last().map_or(0, |(version, _)| *version);
    if current > latest {
        return Err(format!(
            "Database is at schema v{current} but this rollcall build only knows up to v{latest}. \
             Upgrade rollcall before opening it."
        ));
    }

    let mut applied = 0;
    for (version, sql) in migrations.iter().filter(|(v, _)| *v > current) {
        let batch = format!("BEGIN;\n{sql}\nPRAGMA user_version = {version};\nCOMMIT;");
        if let Err(e) = conn.execute_batch(&batch) {
            if !conn.is_autocommit() {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback of schema v{version} failed: {rollback_err}");
                }
            }
            return Err(format!("Schema v{version} failed: {e}"));
        }
        log::info!("Database schema upgraded to v{version}");
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_db() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn test_fresh_db_gets_baseline_once() {
        let conn = mem_db();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(schema_version(&conn).unwrap(), 1);

        for table in ["cohorts", "students", "lessons", "attendance"] {
            let count: i32 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .unwrap_or_else(|e| panic!("{table} table should exist: {e}"));
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_lesson_date_unique_per_cohort() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO cohorts (id, external_id, name) VALUES ('c1', 'COH1', 'Cohort 1');
             INSERT INTO lessons (id, cohort_id, lesson_date) VALUES ('l1', 'c1', '2025-03-02');",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO lessons (id, cohort_id, lesson_date) VALUES ('l2', 'c1', '2025-03-02')",
            [],
        );
        assert!(dup.is_err(), "second lesson on the same date must be rejected");
    }

    #[test]
    fn test_refuses_newer_schema() {
        let conn = mem_db();
        conn.execute_batch("PRAGMA user_version = 7;").unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.contains("v7"), "{err}");
        let tables: i32 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn test_failed_upgrade_keeps_previous_version() {
        let conn = mem_db();
        run_migrations(&conn).unwrap();

        let broken: &[(i32, &str)] = &[
            MIGRATIONS[0],
            (2, "ALTER TABLE lessons ADD COLUMN topic TEXT; SELECT * FROM no_such_table;"),
        ];
        let err = apply(&conn, broken).unwrap_err();
        assert!(err.contains("v2"), "{err}");
        assert_eq!(schema_version(&conn).unwrap(), 1);
        assert!(conn.is_autocommit());

        let has_topic: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('lessons') WHERE name = 'topic'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(has_topic, 0);
    }
}
