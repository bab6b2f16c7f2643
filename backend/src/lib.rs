//! # Clinica - procedure pricing dashboard backend
//!
//! Clinica loads a spreadsheet of clinical procedures with their prices,
//! margins and unit costs at two sites, derives per-row averages, and shapes
//! the rows into what the dashboard draws: grouped bars, a sunburst, headline
//! cards and a detail table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Spreadsheet │────▶│   Loader    │────▶│   Filter    │────▶│   Shapers   │
//! │ (xlsx/csv)  │     │ (+ metrics) │     │ (selection) │     │ bars/sunb./ │
//! └─────────────┘     └─────────────┘     └─────────────┘     │  summary    │
//!                            │                                └─────────────┘
//!                      ┌─────────────┐
//!                      │ TableCache  │
//!                      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clinica::{build_snapshot, load_table, DashboardRequest, LoaderOptions};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let table = load_table(Path::new("Docs/Clinica_Prospct.xlsx"), &LoaderOptions::default())?;
//!     let request = DashboardRequest::default().with_selection(["Facial"]);
//!     let snapshot = build_snapshot(&table, &request)?;
//!     println!("{}", serde_json::to_string_pretty(&snapshot)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Records, tables, views and request parameters
//! - [`config`] - Column mapping, missing-value policy, server settings
//! - [`parser`] - Spreadsheet and CSV reading
//! - [`loader`] - Record loading and coercion
//! - [`transform`] - Metrics, filtering, shaping, summary, pipeline
//! - [`cache`] - Loaded tables keyed by source identity
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading
pub mod loader;
pub mod parser;

// Transformation
pub mod transform;

// Caching
pub mod cache;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    DataSourceError,
    PipelineError,
    ServerError,
    ShapeError,
    SummaryError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ExtremumKind,
    FilteredView,
    GroupBy,
    Metric,
    MetricPairing,
    ProcedureRecord,
    ProcedureTable,
    RawRecord,
    SourceInfo,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ColumnMap, DashboardConfig, LoaderOptions, MissingValuePolicy};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use loader::{load_table, load_table_from_bytes};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    build_snapshot,
    distinct_procedures,
    extremum,
    filter_procedures,
    headline_metrics,
    shape_bars,
    shape_hierarchy,
    DashboardRequest,
    DashboardSnapshot,
    GroupedSeries,
    HeadlineMetrics,
    SunburstTree,
};

// =============================================================================
// Re-exports - Cache
// =============================================================================

pub use cache::{SourceKey, TableCache};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
