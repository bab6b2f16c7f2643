//! Error types for the Clinica dashboard pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DataSourceError`] - Spreadsheet missing, unreadable, or schema mismatch
//! - [`ShapeError`] - Invalid metric requests at the shaper boundary
//! - [`SummaryError`] - Extremal queries that cannot be answered
//! - [`ConfigError`] - Configuration file errors
//! - [`PipelineError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Data Source Errors
// =============================================================================

/// Errors while loading the procedure table.
///
/// Never retried: no valid table can be produced from the source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// Source path does not exist.
    #[error("Data source not found: {0}")]
    NotFound(String),

    /// Failed to read the source.
    #[error("Failed to read data source: {0}")]
    Io(#[from] std::io::Error),

    /// The spreadsheet reader rejected the workbook.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// The CSV reader rejected a record.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Bytes could not be decoded to text.
    #[error("Failed to decode source: {0}")]
    Encoding(String),

    /// No header row, or no worksheet at all.
    #[error("Data source is empty: {0}")]
    EmptySource(String),

    /// File extension not recognized as a spreadsheet.
    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    /// A required column is absent from the header row.
    #[error("Missing required column: '{0}'")]
    MissingColumn(String),

    /// A required cell is blank.
    #[error("Row {row}: missing value in column '{column}'")]
    MissingValue { row: usize, column: String },

    /// A numeric cell holds something that is not a number.
    #[error("Row {row}, column '{column}': '{value}' is not a number")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },
}

impl From<calamine::Error> for DataSourceError {
    fn from(err: calamine::Error) -> Self {
        DataSourceError::Spreadsheet(err.to_string())
    }
}

// =============================================================================
// Shaping Errors
// =============================================================================

/// Errors raised by the chart shapers when a request names bad metrics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShapeError {
    /// Metric name not recognized.
    #[error("Unknown metric: '{0}'")]
    UnknownMetric(String),

    /// The metric list cannot be shaped unambiguously (empty or repeated).
    #[error("Ambiguous aggregation: {0}")]
    AmbiguousAggregation(String),
}

// =============================================================================
// Summary Errors
// =============================================================================

/// Errors from extremal queries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SummaryError {
    /// Extremal query against a view with zero rows.
    #[error("Cannot compute {kind} of '{metric}': the filtered view is empty")]
    EmptyView { metric: String, kind: String },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading the dashboard configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`crate::config::DashboardConfig`].
    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),

    /// Environment override holds a bad value.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// Wraps all lower-level errors so callers can use a single `?`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Loading failed.
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    /// Shaping failed.
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// Summary failed.
    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// No data source has been loaded yet.
    #[error("No data source loaded")]
    NoSource,

    /// A worker task panicked or was cancelled.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<DataSourceError> for ServerError {
    fn from(err: DataSourceError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<ShapeError> for ServerError {
    fn from(err: ShapeError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for loading operations.
pub type DataSourceResult<T> = Result<T, DataSourceError>;

/// Result type for shaping operations.
pub type ShapeResult<T> = Result<T, ShapeError>;

/// Result type for extremal queries.
pub type SummaryResult<T> = Result<T, SummaryError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
