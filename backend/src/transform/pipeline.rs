//! High-level pipeline API: one recomputation pass over a loaded table.
//!
//! Each selection change runs filter → bars → hierarchy → summary against
//! the same immutable [`ProcedureTable`] and returns a [`DashboardSnapshot`]
//! the presentation layer can draw directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use clinica::config::LoaderOptions;
//! use clinica::loader::load_table;
//! use clinica::transform::pipeline::{build_snapshot, DashboardRequest};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let table = load_table(Path::new("procedures.xlsx"), &LoaderOptions::default())?;
//!     let snapshot = build_snapshot(&table, &DashboardRequest::default())?;
//!
//!     println!("{} rows selected", snapshot.row_count);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::bars::{shape_bars_with, BarAggregation, GroupedSeries};
use super::filter::{distinct_procedures, filter_procedures, select_all};
use super::hierarchy::{shape_hierarchy, SunburstTree};
use super::summary::{headline_metrics, HeadlineMetrics};
use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{PipelineResult, SummaryError};
use crate::models::{
    FilteredView, GroupBy, MetricPairing, ProcedureRecord, ProcedureTable, SourceInfo,
};

/// What the user picked in the dashboard controls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardRequest {
    /// Procedures to keep. `None` selects everything; an empty set selects nothing.
    pub selected: Option<HashSet<String>>,
    pub pairing: MetricPairing,
    pub group_by: GroupBy,
    pub aggregation: BarAggregation,
}

impl DashboardRequest {
    pub fn with_selection<I, S>(mut self, procedures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected = Some(procedures.into_iter().map(Into::into).collect());
        self
    }
}

/// The bar chart: its title plus the grouped series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarChart {
    pub title: String,
    pub pairing: MetricPairing,
    #[serde(flatten)]
    pub series: GroupedSeries,
}

/// One line of the detail table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub procedure: String,
    pub product: String,
    pub charged_value: f64,
    pub avg_margin: f64,
    pub avg_margin_pct: f64,
    pub avg_unit_cost: f64,
}

impl From<&ProcedureRecord> for DetailRow {
    fn from(r: &ProcedureRecord) -> Self {
        Self {
            procedure: r.procedure.clone(),
            product: r.product.clone(),
            charged_value: r.charged_value,
            avg_margin: r.avg_margin,
            avg_margin_pct: r.avg_margin_pct,
            avg_unit_cost: r.avg_unit_cost,
        }
    }
}

/// Everything the dashboard shows for one selection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    pub source: SourceInfo,
    /// All procedures of the table, for the selection widget.
    pub procedures: Vec<String>,
    /// Procedures present in the filtered view.
    pub selected: Vec<String>,
    pub row_count: usize,
    pub bars: BarChart,
    pub hierarchy: SunburstTree,
    /// `None` when the selection leaves no rows.
    pub summary: Option<HeadlineMetrics>,
    pub details: Vec<DetailRow>,
}

/// Apply the request's selection to `table`.
pub fn apply_selection(table: &ProcedureTable, request: &DashboardRequest) -> FilteredView {
    match &request.selected {
        Some(selected) => filter_procedures(table, selected),
        None => select_all(table),
    }
}

/// Run one recomputation pass.
///
/// Shaping errors propagate. An empty view still yields empty charts; only
/// the summary is left out, with a warning.
pub fn build_snapshot(
    table: &ProcedureTable,
    request: &DashboardRequest,
) -> PipelineResult<DashboardSnapshot> {
    let view = apply_selection(table, request);
    log_info(format!(
        "Filtered {} of {} rows",
        view.len(),
        table.len()
    ));

    let series = shape_bars_with(
        &view,
        request.group_by,
        request.pairing.metrics(),
        request.aggregation,
    )?;
    log_success(format!(
        "{} bar groups by {}",
        series.groups.len(),
        request.group_by.label().to_lowercase()
    ));

    let hierarchy = shape_hierarchy(&view);
    log_success(format!("{} sunburst nodes", hierarchy.nodes.len()));

    let summary = match headline_metrics(&view) {
        Ok(metrics) => Some(metrics),
        Err(SummaryError::EmptyView { .. }) => {
            log_warning("No rows selected, summary cards left empty");
            None
        }
    };

    Ok(DashboardSnapshot {
        request_id: uuid::Uuid::new_v4().to_string(),
        generated_at: Utc::now(),
        source: table.source.clone(),
        procedures: distinct_procedures(table),
        selected: distinct_procedures(&view),
        row_count: view.len(),
        bars: BarChart {
            title: request.pairing.title(request.group_by),
            pairing: request.pairing,
            series,
        },
        hierarchy,
        summary,
        details: view.records().iter().map(DetailRow::from).collect(),
    })
}
