//! Transformation module.
//!
//! This module turns loaded rows into what the dashboard draws:
//! - Metrics: per-row site averages
//! - Filter: procedure selection
//! - Bars / Hierarchy: chart shapers
//! - Summary: extremal rows and headline cards
//! - Pipeline: one recomputation pass

pub mod bars;
pub mod filter;
pub mod hierarchy;
pub mod metrics;
pub mod pipeline;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_support;

pub use bars::{shape_bars, shape_bars_by_name, shape_bars_with, BarAggregation, GroupedSeries};
pub use filter::{distinct_procedures, filter_procedures, select_all};
pub use hierarchy::{shape_hierarchy, HierarchyAggregation, SunburstNode, SunburstTree};
pub use metrics::derive_metrics;
pub use pipeline::*;
pub use summary::{extremum, headline_metrics, Extremum, HeadlineMetrics};
