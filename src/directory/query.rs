//! CRM query request/response shapes and the filter grammar.
//!
//! The CRM accepts a filter string of `field = value` terms. Booleans are
//! written as `1`/`0`; identifiers are written bare.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Right-hand side of a filter term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Flag(bool),
    Id(String),
}

/// A single equality filter, `field = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    field: String,
    value: FilterValue,
}

impl QueryFilter {
    pub fn flag(field: &str, value: bool) -> Self {
        Self {
            field: field.to_string(),
            value: FilterValue::Flag(value),
        }
    }

    pub fn id(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            value: FilterValue::Id(value.trim().to_string()),
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FilterValue::Flag(v) => write!(f, "{} = {}", self.field, u8::from(*v)),
            FilterValue::Id(v) => write!(f, "({} = {})", self.field, v),
        }
    }
}

/// Body of a CRM query request.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    pub page_size: u32,
    pub objecttype: u32,
}

impl QueryRequest {
    pub fn new(object_type: u32, filter: &QueryFilter, page_size: u32) -> Self {
        Self {
            query: filter.to_string(),
            fields: None,
            page_size,
            objecttype: object_type,
        }
    }

    /// Restrict the returned columns.
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.join(","));
        self
    }
}

/// Body of a CRM query response. Only the first page is ever consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<QueryPage>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryPage {
    #[serde(default)]
    pub data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    #[serde(default)]
    pub page_num: Option<u32>,
    #[serde(default)]
    pub is_last_page: Option<bool>,
}

impl QueryResponse {
    /// Rows of the first page; a successful response without a row list
    /// is treated as empty.
    pub fn into_rows(self) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, String> {
        if !self.success {
            return Err(self
                .message
                .unwrap_or_else(|| "success flag was false".to_string()));
        }
        let page = match self.data {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };
        if page.is_last_page == Some(false) {
            log::debug!(
                "CRM result has more pages after page {}; only the first is used",
                page.page_num.unwrap_or(1)
            );
        }
        Ok(page.data.unwrap_or_default())
    }
}

/// Read a string column, treating missing, non-string, or blank values as absent.
pub fn text_field(row: &serde_json::Map<String, serde_json::Value>, field: &str) -> Option<String> {
    row.get(field)
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}
