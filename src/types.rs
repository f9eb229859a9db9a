use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::directory::CrmConfig;

/// Application configuration (~/.rollcall/config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub crm: CrmConfig,
    /// Overrides the default `~/.rollcall/rollcall.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Joins the CRM cohort name and course name into a display name.
    #[serde(default = "default_display_name_separator")]
    pub display_name_separator: String,
}

fn default_display_name_separator() -> String {
    " - ".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crm: CrmConfig::default(),
            database_path: None,
            display_name_separator: default_display_name_separator(),
        }
    }
}

/// Aggregate result of a directory sync.
///
/// Skipped counts cover per-entity failures that were logged and passed
/// over; they are the only record of which parts of the directory were
/// not reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub cohorts_synced: usize,
    pub students_synced: usize,
    pub cohorts_skipped: usize,
    pub students_skipped: usize,
}

impl SyncSummary {
    pub fn message(&self) -> String {
        let mut msg = format!(
            "Synced {} cohorts and {} students",
            self.cohorts_synced, self.students_synced
        );
        if self.cohorts_skipped > 0 || self.students_skipped > 0 {
            msg.push_str(&format!(
                " ({} cohorts and {} students skipped, see log)",
                self.cohorts_skipped, self.students_skipped
            ));
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses_partial_file() {
        let config: Config =
            serde_json::from_str(r#"{"crm": {"token": "t-1"}, "databasePath": "/tmp/r.db"}"#)
                .unwrap();
        assert_eq!(config.crm.token.as_deref(), Some("t-1"));
        assert_eq!(config.crm.page_size, 500);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/r.db")));
        assert_eq!(config.display_name_separator, " - ");
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = SyncSummary {
            cohorts_synced: 1,
            students_synced: 2,
            ..SyncSummary::default()
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["cohortsSynced"], 1);
        assert_eq!(json["studentsSynced"], 2);
        assert_eq!(json["cohortsSkipped"], 0);
        assert_eq!(summary.message(), "Synced 1 cohorts and 2 students");
    }
}
