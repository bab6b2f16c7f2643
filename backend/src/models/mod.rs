//! Domain models for the Clinica dashboard pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`RawRecord`] - One spreadsheet row as read, before metric derivation
//! - [`ProcedureRecord`] - A row with its derived averages
//! - [`ProcedureTable`] / [`FilteredView`] - Immutable row collections
//! - [`Metric`] - Closed set of numeric fields the shapers accept
//! - [`GroupBy`], [`ExtremumKind`], [`MetricPairing`] - Request parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ShapeError;

// =============================================================================
// Records
// =============================================================================

/// A spreadsheet row as read by the loader.
///
/// Every value is optional: the missing-value policy decides what an
/// absent cell means when metrics are derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// 1-based row number in the source, header included.
    pub row: usize,
    pub procedure: Option<String>,
    pub product: Option<String>,
    pub charged_value: Option<f64>,
    pub margin_location_a: Option<f64>,
    pub margin_location_b: Option<f64>,
    pub margin_pct_location_a: Option<f64>,
    pub margin_pct_location_b: Option<f64>,
    pub unit_cost_location_a: Option<f64>,
    pub unit_cost_location_b: Option<f64>,
}

/// One procedure/product row with its derived averages.
///
/// Built only by [`crate::transform::metrics::derive_metrics`]. Site columns
/// hold exactly what the source held: a blank cell stays `None` whatever the
/// missing-value policy, and only the averages reflect the policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureRecord {
    /// Category label, shared by many products.
    pub procedure: String,
    /// Sub-item of the procedure.
    pub product: String,
    /// Amount charged per session, cash.
    pub charged_value: f64,
    pub margin_location_a: Option<f64>,
    pub margin_location_b: Option<f64>,
    /// Fractional margin, 0..1 as stored.
    pub margin_pct_location_a: Option<f64>,
    pub margin_pct_location_b: Option<f64>,
    pub unit_cost_location_a: Option<f64>,
    pub unit_cost_location_b: Option<f64>,
    /// Mean of the two site margins.
    pub avg_margin: f64,
    /// Mean of the two site margin ratios, scaled to percent.
    pub avg_margin_pct: f64,
    /// Mean of the two site unit costs.
    pub avg_unit_cost: f64,
}

// =============================================================================
// Tables and Views
// =============================================================================

/// Where a table came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// File name or upload name.
    pub name: String,
    /// `xlsx`, `csv`, ...
    pub format: String,
    /// Worksheet the rows were read from (spreadsheets only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Header row as found in the source.
    pub headers: Vec<String>,
    /// Data rows read, before any were dropped.
    pub rows_read: usize,
    /// Rows excluded by [`crate::config::MissingValuePolicy::DropRow`].
    pub rows_dropped: usize,
}

impl SourceInfo {
    /// Source info for tables assembled in memory.
    pub fn in_memory(rows: usize) -> Self {
        Self {
            name: "in-memory".to_string(),
            format: "memory".to_string(),
            sheet: None,
            headers: Vec::new(),
            rows_read: rows,
            rows_dropped: 0,
        }
    }
}

/// The full, metric-augmented table loaded from one source version.
///
/// Never mutated after load; the cache hands it out behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureTable {
    pub source: SourceInfo,
    records: Vec<ProcedureRecord>,
}

impl ProcedureTable {
    pub fn new(source: SourceInfo, records: Vec<ProcedureRecord>) -> Self {
        Self { source, records }
    }

    /// Build a table from rows that were not read from a file.
    pub fn from_records(records: Vec<ProcedureRecord>) -> Self {
        Self::new(SourceInfo::in_memory(records.len()), records)
    }

    pub fn records(&self) -> &[ProcedureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AsRef<[ProcedureRecord]> for ProcedureTable {
    fn as_ref(&self) -> &[ProcedureRecord] {
        &self.records
    }
}

/// A read-only subset of a table, produced per selection change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilteredView {
    records: Vec<ProcedureRecord>,
}

impl FilteredView {
    pub(crate) fn new(records: Vec<ProcedureRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ProcedureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AsRef<[ProcedureRecord]> for FilteredView {
    fn as_ref(&self) -> &[ProcedureRecord] {
        &self.records
    }
}

// =============================================================================
// Metric
// =============================================================================

/// A numeric field of [`ProcedureRecord`] that charts and summaries can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ChargedValue,
    MarginLocationA,
    MarginLocationB,
    MarginPctLocationA,
    MarginPctLocationB,
    UnitCostLocationA,
    UnitCostLocationB,
    AvgMargin,
    AvgMarginPct,
    AvgUnitCost,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::ChargedValue,
        Metric::MarginLocationA,
        Metric::MarginLocationB,
        Metric::MarginPctLocationA,
        Metric::MarginPctLocationB,
        Metric::UnitCostLocationA,
        Metric::UnitCostLocationB,
        Metric::AvgMargin,
        Metric::AvgMarginPct,
        Metric::AvgUnitCost,
    ];

    /// Read this field from a record. `None` only for a blank site cell.
    pub fn value(&self, record: &ProcedureRecord) -> Option<f64> {
        match self {
            Metric::ChargedValue => Some(record.charged_value),
            Metric::MarginLocationA => record.margin_location_a,
            Metric::MarginLocationB => record.margin_location_b,
            Metric::MarginPctLocationA => record.margin_pct_location_a,
            Metric::MarginPctLocationB => record.margin_pct_location_b,
            Metric::UnitCostLocationA => record.unit_cost_location_a,
            Metric::UnitCostLocationB => record.unit_cost_location_b,
            Metric::AvgMargin => Some(record.avg_margin),
            Metric::AvgMarginPct => Some(record.avg_margin_pct),
            Metric::AvgUnitCost => Some(record.avg_unit_cost),
        }
    }

    /// Identifier used on the wire and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Metric::ChargedValue => "charged_value",
            Metric::MarginLocationA => "margin_location_a",
            Metric::MarginLocationB => "margin_location_b",
            Metric::MarginPctLocationA => "margin_pct_location_a",
            Metric::MarginPctLocationB => "margin_pct_location_b",
            Metric::UnitCostLocationA => "unit_cost_location_a",
            Metric::UnitCostLocationB => "unit_cost_location_b",
            Metric::AvgMargin => "avg_margin",
            Metric::AvgMarginPct => "avg_margin_pct",
            Metric::AvgUnitCost => "avg_unit_cost",
        }
    }

    /// Human-readable series name.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::ChargedValue => "Charged value",
            Metric::MarginLocationA => "Margin (location A)",
            Metric::MarginLocationB => "Margin (location B)",
            Metric::MarginPctLocationA => "Margin ratio (location A)",
            Metric::MarginPctLocationB => "Margin ratio (location B)",
            Metric::UnitCostLocationA => "Unit cost (location A)",
            Metric::UnitCostLocationB => "Unit cost (location B)",
            Metric::AvgMargin => "Average margin",
            Metric::AvgMarginPct => "Average margin %",
            Metric::AvgUnitCost => "Average unit cost",
        }
    }

    /// Whether the value is already scaled to percent.
    pub fn is_percent(&self) -> bool {
        matches!(self, Metric::AvgMarginPct)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Metric {
    type Err = ShapeError;

    /// Accepts the snake_case id, camelCase, or kebab-case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.id().replace('_', "") == normalized)
            .ok_or_else(|| ShapeError::UnknownMetric(s.to_string()))
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Dimension the bar charts are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Procedure,
    Product,
}

impl GroupBy {
    pub fn label(&self) -> &'static str {
        match self {
            GroupBy::Procedure => "Procedure",
            GroupBy::Product => "Product",
        }
    }
}

impl FromStr for GroupBy {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "procedure" | "procedimento" => Ok(GroupBy::Procedure),
            "product" | "produto" => Ok(GroupBy::Product),
            other => Err(ShapeError::AmbiguousAggregation(format!(
                "unknown grouping dimension '{}'",
                other
            ))),
        }
    }
}

/// Direction of an extremal query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    Max,
    Min,
}

impl fmt::Display for ExtremumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtremumKind::Max => f.write_str("max"),
            ExtremumKind::Min => f.write_str("min"),
        }
    }
}

/// The metric combinations the bar chart offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricPairing {
    /// Charged value next to average margin.
    #[default]
    ValueMargin,
    /// Average margin alone.
    MarginOnly,
    /// Charged value next to average unit cost.
    ValueCost,
}

impl MetricPairing {
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            MetricPairing::ValueMargin => &[Metric::ChargedValue, Metric::AvgMargin],
            MetricPairing::MarginOnly => &[Metric::AvgMargin],
            MetricPairing::ValueCost => &[Metric::ChargedValue, Metric::AvgUnitCost],
        }
    }

    /// Chart title for this pairing under a grouping.
    pub fn title(&self, group_by: GroupBy) -> String {
        let what = match self {
            MetricPairing::ValueMargin => "Charged value and average margin",
            MetricPairing::MarginOnly => "Average margin",
            MetricPairing::ValueCost => "Charged value and average unit cost",
        };
        format!("{} by {}", what, group_by.label().to_lowercase())
    }
}

impl FromStr for MetricPairing {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "value_margin" => Ok(MetricPairing::ValueMargin),
            "margin_only" | "margin" => Ok(MetricPairing::MarginOnly),
            "value_cost" => Ok(MetricPairing::ValueCost),
            other => Err(ShapeError::UnknownMetric(other.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_from_str_spellings() {
        assert_eq!("avg_margin".parse::<Metric>(), Ok(Metric::AvgMargin));
        assert_eq!("avgMarginPct".parse::<Metric>(), Ok(Metric::AvgMarginPct));
        assert_eq!("charged-value".parse::<Metric>(), Ok(Metric::ChargedValue));
        assert_eq!(
            "avg_margn".parse::<Metric>(),
            Err(ShapeError::UnknownMetric("avg_margn".into()))
        );
    }

    #[test]
    fn test_metric_ids_roundtrip() {
        for metric in Metric::ALL {
            assert_eq!(metric.id().parse::<Metric>(), Ok(metric));
        }
    }

    #[test]
    fn test_pairing_metrics() {
        assert_eq!(
            MetricPairing::ValueCost.metrics(),
            &[Metric::ChargedValue, Metric::AvgUnitCost]
        );
        assert_eq!(MetricPairing::MarginOnly.metrics().len(), 1);
        assert_eq!(
            MetricPairing::ValueMargin.title(GroupBy::Product),
            "Charged value and average margin by product"
        );
    }

    #[test]
    fn test_group_by_from_str() {
        assert_eq!("Product".parse::<GroupBy>(), Ok(GroupBy::Product));
        assert_eq!("procedimento".parse::<GroupBy>(), Ok(GroupBy::Procedure));
        assert!("location".parse::<GroupBy>().is_err());
    }

    #[test]
    fn test_metric_serializes_as_id() {
        let json = serde_json::to_string(&Metric::AvgUnitCost).unwrap();
        assert_eq!(json, "\"avg_unit_cost\"");
    }
}
