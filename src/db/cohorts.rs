use rusqlite::{params, OptionalExtension, Row};

use super::*;
use crate::util::collation_key;

fn map_cohort(row: &Row<'_>) -> rusqlite::Result<DbCohort> {
    Ok(DbCohort {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl AttendanceDb {
    // =========================================================================
    // Cohorts
    // =========================================================================

    /// Look up a cohort by its CRM identifier.
    pub fn get_cohort_by_external_id(&self, external_id: &str) -> Result<Option<DbCohort>, DbError> {
        let cohort = self
            .conn
            .query_row(
                "SELECT id, external_id, name, created_at
                 FROM cohorts WHERE external_id = ?1",
                params![external_id],
                map_cohort,
            )
            .optional()?;
        Ok(cohort)
    }

    /// Resolve the local identifier for a CRM cohort.
    ///
    /// `DbError::NotFound` means the cohort has not been synced yet.
    pub fn get_cohort_local_id(&self, external_id: &str) -> Result<String, DbError> {
        self.get_cohort_by_external_id(external_id)?
            .map(|c| c.id)
            .ok_or_else(|| DbError::NotFound(format!("cohort with external id {external_id}")))
    }

    /// Insert a cohort first seen in the CRM. Fails with `Conflict` if the
    /// external identifier is already mapped.
    pub fn insert_cohort(&self, external_id: &str, name: &str) -> Result<DbCohort, DbError> {
        let cohort = DbCohort {
            id: new_id(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            created_at: now_rfc3339(),
        };
        self.conn.execute(
            "INSERT INTO cohorts (id, external_id, name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![cohort.id, cohort.external_id, cohort.name, cohort.created_at],
        )?;
        Ok(cohort)
    }

    /// All synced cohorts, ordered by display name.
    pub fn list_cohorts(&self) -> Result<Vec<DbCohort>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, external_id, name, created_at FROM cohorts")?;
        let rows = stmt.query_map([], map_cohort)?;

        let mut cohorts = Vec::new();
        for row in rows {
            cohorts.push(row?);
        }
        cohorts.sort_by_cached_key(|c| collation_key(&c.name));
        Ok(cohorts)
    }
}
