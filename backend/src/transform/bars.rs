//! Grouped-series shaper for the bar charts.
//!
//! Groups rows by procedure or by (procedure, product) and emits one value
//! series per requested metric, all aligned on the same group order.
//!
//! ```text
//! rows                                  groups          charged  margin
//! ┌──────────────────────────────┐      ┌─────────┐     ┌─────┐  ┌─────┐
//! │ Facial   Peel     300  110   │      │ Facial  │ ──▶ │ 450 │  │ 220 │
//! │ Corporal Massagem 200   85   │  →   │ Corporal│ ──▶ │ 200 │  │  85 │
//! │ Facial   Limpeza  150  110   │      └─────────┘     └─────┘  └─────┘
//! └──────────────────────────────┘
//! ```
//!
//! Grouping by product always keys on `(procedure, product)`: the same
//! product name under two procedures stays two bars.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ShapeError, ShapeResult};
use crate::models::{GroupBy, Metric, ProcedureRecord};

/// How rows that fall in the same group are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarAggregation {
    /// Stacked height of the rows, what a bar chart draws for repeated categories.
    #[default]
    Sum,
    Mean,
}

/// Identity of a bar group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    pub procedure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl GroupKey {
    fn for_record(record: &ProcedureRecord, group_by: GroupBy) -> Self {
        Self {
            procedure: record.procedure.clone(),
            product: match group_by {
                GroupBy::Procedure => None,
                GroupBy::Product => Some(record.product.clone()),
            },
        }
    }
}

/// One category on the x axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarGroup {
    pub key: GroupKey,
    /// Axis label; product groups carry their procedure only when the
    /// product name is shared by several procedures in the view.
    pub label: String,
    pub row_count: usize,
}

/// Values of one metric, aligned with [`GroupedSeries::groups`].
///
/// A value is `None` when every row of its group left the metric blank.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeries {
    pub metric: Metric,
    pub label: String,
    pub values: Vec<Option<f64>>,
}

/// Input for a grouped bar chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedSeries {
    pub group_by: GroupBy,
    pub aggregation: BarAggregation,
    pub groups: Vec<BarGroup>,
    pub series: Vec<MetricSeries>,
}

impl GroupedSeries {
    /// Value of `metric` for the group at `index`.
    pub fn value(&self, metric: Metric, index: usize) -> Option<f64> {
        self.series
            .iter()
            .find(|s| s.metric == metric)
            .and_then(|s| s.values.get(index).copied().flatten())
    }
}

/// Shape with [`BarAggregation::Sum`].
pub fn shape_bars<S>(view: &S, group_by: GroupBy, metrics: &[Metric]) -> ShapeResult<GroupedSeries>
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    shape_bars_with(view, group_by, metrics, BarAggregation::Sum)
}

/// Shape from metric names, rejecting any name that is not a [`Metric`].
pub fn shape_bars_by_name<S>(
    view: &S,
    group_by: GroupBy,
    names: &[&str],
) -> ShapeResult<GroupedSeries>
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    let metrics = names
        .iter()
        .map(|n| n.parse::<Metric>())
        .collect::<ShapeResult<Vec<_>>>()?;
    shape_bars(view, group_by, &metrics)
}

/// Group `view` and produce one series per metric, in request order.
pub fn shape_bars_with<S>(
    view: &S,
    group_by: GroupBy,
    metrics: &[Metric],
    aggregation: BarAggregation,
) -> ShapeResult<GroupedSeries>
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    validate_metrics(metrics)?;

    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut keys: Vec<GroupKey> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut totals: Vec<Vec<Option<f64>>> = vec![Vec::new(); metrics.len()];
    let mut present: Vec<Vec<usize>> = vec![Vec::new(); metrics.len()];

    for record in view.as_ref() {
        let key = GroupKey::for_record(record, group_by);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            keys.push(key);
            counts.push(0);
            for (series, seen) in totals.iter_mut().zip(present.iter_mut()) {
                series.push(None);
                seen.push(0);
            }
            keys.len() - 1
        });

        counts[slot] += 1;
        for ((series, seen), metric) in totals.iter_mut().zip(present.iter_mut()).zip(metrics) {
            // Blank site cells add nothing; a group with none left stays None
            if let Some(v) = metric.value(record) {
                series[slot] = Some(series[slot].unwrap_or(0.0) + v);
                seen[slot] += 1;
            }
        }
    }

    if aggregation == BarAggregation::Mean {
        for (series, seen) in totals.iter_mut().zip(&present) {
            for (value, n) in series.iter_mut().zip(seen) {
                if let Some(v) = value.as_mut() {
                    *v /= *n as f64;
                }
            }
        }
    }

    let labels = group_labels(&keys);
    let groups = keys
        .into_iter()
        .zip(labels)
        .zip(counts)
        .map(|((key, label), row_count)| BarGroup {
            key,
            label,
            row_count,
        })
        .collect();

    let series = metrics
        .iter()
        .zip(totals)
        .map(|(metric, values)| MetricSeries {
            metric: *metric,
            label: metric.label().to_string(),
            values,
        })
        .collect();

    Ok(GroupedSeries {
        group_by,
        aggregation,
        groups,
        series,
    })
}

fn validate_metrics(metrics: &[Metric]) -> ShapeResult<()> {
    if metrics.is_empty() {
        return Err(ShapeError::AmbiguousAggregation(
            "no metrics requested".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for metric in metrics {
        if !seen.insert(metric) {
            return Err(ShapeError::AmbiguousAggregation(format!(
                "metric '{}' requested more than once",
                metric
            )));
        }
    }
    Ok(())
}

fn group_labels(keys: &[GroupKey]) -> Vec<String> {
    let mut product_counts: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        if let Some(product) = &key.product {
            *product_counts.entry(product.as_str()).or_insert(0) += 1;
        }
    }

    keys.iter()
        .map(|key| match &key.product {
            None => key.procedure.clone(),
            Some(p) if product_counts.get(p.as_str()).copied().unwrap_or(0) > 1 => {
                format!("{} ({})", p, key.procedure)
            }
            Some(p) => p.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilteredView, MetricPairing};
    use crate::transform::test_support::{record, record_with};

    fn view() -> FilteredView {
        FilteredView::new(vec![
            record("Facial", "Peel", 300.0),
            record_with("Corporal", "Massagem", 200.0, (80.0, 90.0), (0.4, 0.45), (30.0, 35.0)),
            record("Facial", "Limpeza", 150.0),
        ])
    }

    #[test]
    fn test_group_by_procedure_sums() {
        let shaped = shape_bars(&view(), GroupBy::Procedure, MetricPairing::ValueMargin.metrics())
            .unwrap();

        let labels: Vec<&str> = shaped.groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Facial", "Corporal"]);
        assert_eq!(shaped.groups[0].row_count, 2);

        assert_eq!(shaped.series.len(), 2);
        assert_eq!(shaped.series[0].metric, Metric::ChargedValue);
        assert_eq!(shaped.series[0].values, vec![Some(450.0), Some(200.0)]);
        assert_eq!(shaped.value(Metric::AvgMargin, 0), Some(220.0));
        assert_eq!(shaped.value(Metric::AvgMargin, 1), Some(85.0));
    }

    #[test]
    fn test_mean_aggregation() {
        let shaped = shape_bars_with(
            &view(),
            GroupBy::Procedure,
            &[Metric::ChargedValue],
            BarAggregation::Mean,
        )
        .unwrap();

        assert_eq!(shaped.series[0].values, vec![Some(225.0), Some(200.0)]);
    }

    #[test]
    fn test_series_aligned_on_groups() {
        let shaped = shape_bars(&view(), GroupBy::Product, MetricPairing::ValueCost.metrics())
            .unwrap();

        assert_eq!(shaped.groups.len(), 3);
        for series in &shaped.series {
            assert_eq!(series.values.len(), shaped.groups.len());
        }
        assert_eq!(shaped.value(Metric::AvgUnitCost, 1), Some(32.5));
    }

    #[test]
    fn test_shared_product_name_stays_two_groups() {
        // Compound key: "Laser" under Facial and under Capilar are distinct bars.
        let view = FilteredView::new(vec![
            record("Facial", "Laser", 400.0),
            record("Capilar", "Laser", 500.0),
            record("Facial", "Peel", 300.0),
        ]);

        let shaped = shape_bars(&view, GroupBy::Product, &[Metric::ChargedValue]).unwrap();

        let labels: Vec<&str> = shaped.groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["Laser (Facial)", "Laser (Capilar)", "Peel"]);
        assert_eq!(shaped.series[0].values, vec![Some(400.0), Some(500.0), Some(300.0)]);
        assert_eq!(
            shaped.groups[1].key,
            GroupKey {
                procedure: "Capilar".into(),
                product: Some("Laser".into())
            }
        );
    }

    #[test]
    fn test_empty_view_gives_empty_series() {
        let shaped = shape_bars(&FilteredView::default(), GroupBy::Procedure, &[Metric::AvgMargin])
            .unwrap();

        assert!(shaped.groups.is_empty());
        assert_eq!(shaped.series.len(), 1);
        assert!(shaped.series[0].values.is_empty());
    }

    #[test]
    fn test_no_metrics_is_ambiguous() {
        let err = shape_bars(&view(), GroupBy::Procedure, &[]).unwrap_err();
        assert!(matches!(err, ShapeError::AmbiguousAggregation(_)));
    }

    #[test]
    fn test_duplicate_metric_is_ambiguous() {
        let err = shape_bars(&view(), GroupBy::Procedure, &[Metric::AvgMargin, Metric::AvgMargin])
            .unwrap_err();
        assert!(matches!(err, ShapeError::AmbiguousAggregation(_)));
    }

    #[test]
    fn test_unknown_metric_name_fails_fast() {
        let err = shape_bars_by_name(&view(), GroupBy::Procedure, &["charged_value", "margem"])
            .unwrap_err();
        assert_eq!(err, ShapeError::UnknownMetric("margem".into()));
    }

    #[test]
    fn test_metric_names_accepted() {
        let shaped =
            shape_bars_by_name(&view(), GroupBy::Procedure, &["avg_margin", "unit_cost_location_a"])
                .unwrap();
        assert_eq!(shaped.series[1].metric, Metric::UnitCostLocationA);
        assert_eq!(shaped.series[1].values, vec![Some(100.0), Some(30.0)]);
    }

    #[test]
    fn test_blank_site_cells_are_not_counted() {
        let mut partial = record("Facial", "Laser", 400.0);
        partial.margin_location_b = None;
        let mut blank = record("Capilar", "Laser", 500.0);
        blank.margin_location_b = None;

        let view = FilteredView::new(vec![record("Facial", "Peel", 300.0), partial, blank]);
        let shaped = shape_bars_with(
            &view,
            GroupBy::Procedure,
            &[Metric::MarginLocationB, Metric::ChargedValue],
            BarAggregation::Mean,
        )
        .unwrap();

        assert_eq!(shaped.series[0].values, vec![Some(120.0), None]);
        assert_eq!(shaped.value(Metric::MarginLocationB, 1), None);
        assert_eq!(shaped.series[1].values, vec![Some(350.0), Some(500.0)]);
        assert_eq!(shaped.groups[0].row_count, 2);
    }
}
