//! CRM directory integration.
//!
//! The CRM is the system of record for cohorts and students. This module
//! only reads from it: `client` speaks the CRM query API over HTTP, `query`
//! renders the filter grammar, and [`DirectorySource`] is the seam the sync
//! engine depends on.

pub mod client;
pub mod query;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configured CRM token.
pub const TOKEN_ENV_VAR: &str = "ROLLCALL_CRM_TOKEN";

/// CRM connection settings stored in ~/.rollcall/config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_cohort_object_type")]
    pub cohort_object_type: u32,
    #[serde(default = "default_student_object_type")]
    pub student_object_type: u32,
}

fn default_api_url() -> String {
    "https://api.fireberry.com/api/query".to_string()
}

fn default_page_size() -> u32 {
    500
}

fn default_cohort_object_type() -> u32 {
    1004
}

fn default_student_object_type() -> u32 {
    1002
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            page_size: default_page_size(),
            cohort_object_type: default_cohort_object_type(),
            student_object_type: default_student_object_type(),
        }
    }
}

impl CrmConfig {
    /// The token to authenticate with: the environment variable wins over
    /// the config file. Blank values count as unset.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .or_else(|| self.token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// A cohort as the CRM reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalCohort {
    pub external_id: String,
    pub name: String,
    /// Course name; empty when the CRM leaves it blank.
    pub secondary_name: String,
}

impl ExternalCohort {
    /// Display name for a new local cohort: "name<sep>course" when the
    /// course name is present, else the name alone.
    pub fn display_name(&self, separator: &str) -> String {
        let secondary = self.secondary_name.trim();
        if secondary.is_empty() {
            self.name.clone()
        } else {
            format!("{}{}{}", self.name, separator, secondary)
        }
    }
}

/// A student as the CRM reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalStudent {
    pub external_id: String,
    pub name: String,
}

/// Errors from CRM directory queries.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("CRM returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("CRM request failed: {0}")]
    Network(String),
    #[error("CRM rejected the query: {0}")]
    Rejected(String),
    #[error("Failed to parse CRM response: {0}")]
    Parse(String),
}

/// Read access to the CRM directory.
///
/// Result order is whatever the CRM returns; callers must not rely on it.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Cohorts flagged as visible on the attendance system.
    async fn fetch_cohorts(&self) -> Result<Vec<ExternalCohort>, DirectoryError>;

    /// Students associated with a cohort, scoped by the cohort's CRM id.
    async fn fetch_students(
        &self,
        external_cohort_id: &str,
    ) -> Result<Vec<ExternalStudent>, DirectoryError>;
}
