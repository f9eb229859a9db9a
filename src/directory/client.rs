//! HTTP client for the CRM query API.
//!
//! Uses reqwest with the `tokenid` header. Every call is a POST of a
//! [`QueryRequest`] to the configured endpoint; only the first result page
//! is read.

use async_trait::async_trait;

use super::query::{text_field, QueryFilter, QueryRequest, QueryResponse};
use super::{CrmConfig, DirectoryError, DirectorySource, ExternalCohort, ExternalStudent};

const COHORT_ID_FIELD: &str = "customobject1004id";
const COHORT_NAME_FIELD: &str = "name";
const COHORT_COURSE_FIELD: &str = "pcfCoursename";
const COHORT_VISIBLE_FIELD: &str = "pcfShouldShowOnAttendanceSystem";

const STUDENT_ID_FIELD: &str = "pcfLeadObjId";
const STUDENT_NAME_FIELD: &str = "pcfFullName";
const STUDENT_COHORT_FIELD: &str = "pcfCohort";

pub struct CrmClient {
    client: reqwest::Client,
    endpoint: url::Url,
    token: String,
    page_size: u32,
    cohort_object_type: u32,
    student_object_type: u32,
}

impl CrmClient {
    /// Build a client from config. Fails if the endpoint is not a valid URL
    /// or no token is configured.
    pub fn new(config: &CrmConfig) -> Result<Self, String> {
        let endpoint = url::Url::parse(&config.api_url)
            .map_err(|e| format!("Invalid CRM api url '{}': {}", config.api_url, e))?;
        let token = config.resolved_token().ok_or_else(|| {
            format!(
                "No CRM token configured. Set crm.token in config.json or {}",
                super::TOKEN_ENV_VAR
            )
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            token,
            page_size: config.page_size,
            cohort_object_type: config.cohort_object_type,
            student_object_type: config.student_object_type,
        })
    }

    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, DirectoryError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header("accept", "application/json")
            .header("tokenid", self.token.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            };
            return Err(DirectoryError::Http {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<QueryResponse>()
            .await
            .map_err(|e| DirectoryError::Parse(e.to_string()))
    }
}

/// Map cohort rows, dropping rows without an id or a name.
pub fn cohorts_from_response(resp: QueryResponse) -> Result<Vec<ExternalCohort>, DirectoryError> {
    let rows = resp.into_rows().map_err(DirectoryError::Rejected)?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let external_id = text_field(row, COHORT_ID_FIELD)?;
            let name = text_field(row, COHORT_NAME_FIELD)?;
            Some(ExternalCohort {
                external_id,
                name,
                secondary_name: text_field(row, COHORT_COURSE_FIELD).unwrap_or_default(),
            })
        })
        .collect())
}

/// Map student rows, dropping rows without an id or a name.
pub fn students_from_response(
    resp: QueryResponse,
) -> Result<Vec<ExternalStudent>, DirectoryError> {
    let rows = resp.into_rows().map_err(DirectoryError::Rejected)?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            Some(ExternalStudent {
                external_id: text_field(row, STUDENT_ID_FIELD)?,
                name: text_field(row, STUDENT_NAME_FIELD)?,
            })
        })
        .collect())
}

#[async_trait]
impl DirectorySource for CrmClient {
    async fn fetch_cohorts(&self) -> Result<Vec<ExternalCohort>, DirectoryError> {
        let request = QueryRequest::new(
            self.cohort_object_type,
            &QueryFilter::flag(COHORT_VISIBLE_FIELD, true),
            self.page_size,
        );
        let cohorts = cohorts_from_response(self.query(&request).await?)?;
        log::debug!("CRM: fetched {} visible cohorts", cohorts.len());
        Ok(cohorts)
    }

    async fn fetch_students(
        &self,
        external_cohort_id: &str,
    ) -> Result<Vec<ExternalStudent>, DirectoryError> {
        let request = QueryRequest::new(
            self.student_object_type,
            &QueryFilter::id(STUDENT_COHORT_FIELD, external_cohort_id),
            self.page_size,
        )
        .with_fields(&[STUDENT_NAME_FIELD, STUDENT_ID_FIELD]);
        let students = students_from_response(self.query(&request).await?)?;
        log::debug!(
            "CRM: fetched {} students for cohort {}",
            students.len(),
            external_cohort_id
        );
        Ok(students)
    }
}
