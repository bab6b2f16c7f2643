//! REST API types for dashboard clients.
//!
//! Snapshots are returned as built by the pipeline; this module adds the
//! upload and listing envelopes and maps errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::cache::SourceKey;
use crate::error::{DataSourceError, PipelineError, ServerError};
use crate::models::{ProcedureTable, SourceInfo};
use crate::transform::distinct_procedures;

/// Procedures of the active table, for the selection widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceduresResponse {
    pub source: SourceInfo,
    pub procedures: Vec<String>,
}

impl From<&ProcedureTable> for ProceduresResponse {
    fn from(table: &ProcedureTable) -> Self {
        Self {
            source: table.source.clone(),
            procedures: distinct_procedures(table),
        }
    }
}

/// Response sent after a spreadsheet upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ready", or "warning" when rows were dropped
    pub status: String,

    /// Cache key of the uploaded source
    pub source_key: String,

    pub source: SourceInfo,

    pub procedures: Vec<String>,

    pub row_count: usize,
}

impl UploadResponse {
    pub fn new(key: &SourceKey, table: &ProcedureTable) -> Self {
        let status = if table.source.rows_dropped == 0 { "ready" } else { "warning" };
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            source_key: key.to_string(),
            source: table.source.clone(),
            procedures: distinct_procedures(table),
            row_count: table.len(),
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NoSource => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(err) => match err {
                PipelineError::DataSource(DataSourceError::NotFound(_)) => StatusCode::NOT_FOUND,
                PipelineError::DataSource(DataSourceError::Io(_)) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                PipelineError::DataSource(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PipelineError::Shape(_) => StatusCode::BAD_REQUEST,
                PipelineError::Summary(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(error_response(&self.to_string()))).into_response()
    }
}
