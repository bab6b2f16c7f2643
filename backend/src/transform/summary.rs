//! Extremal summary: best/worst rows per metric and the headline cards.

use serde::Serialize;

use crate::error::{SummaryError, SummaryResult};
use crate::models::{ExtremumKind, Metric, ProcedureRecord};

/// The row holding an extremal value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extremum {
    /// Procedure label of the row
    pub procedure: String,
    /// Product of the row, for drill-down
    pub product: String,
    pub metric: Metric,
    pub kind: ExtremumKind,
    pub value: f64,
    /// 0-based position in the view
    pub index: usize,
}

impl Extremum {
    /// `(procedure, value)`, the pair a summary card shows.
    pub fn label_value(&self) -> (&str, f64) {
        (&self.procedure, self.value)
    }

    /// Value formatted for display: percent metrics as `12.34%`,
    /// everything else as `R$ 1,234.56`.
    pub fn formatted_value(&self) -> String {
        if self.metric.is_percent() {
            format_percent(self.value)
        } else {
            format_currency(self.value)
        }
    }
}

/// Find the row with the largest or smallest `metric`.
///
/// Ties go to the first row in view order. Rows that left a site metric
/// blank are passed over. Fails with [`SummaryError::EmptyView`] when no
/// row carries a value.
pub fn extremum<S>(view: &S, metric: Metric, kind: ExtremumKind) -> SummaryResult<Extremum>
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    let records = view.as_ref();

    let mut best: Option<(usize, f64)> = None;
    for (i, record) in records.iter().enumerate() {
        let Some(value) = metric.value(record) else {
            continue;
        };
        let better = match (best, kind) {
            (None, _) => true,
            (Some((_, b)), ExtremumKind::Max) => value > b,
            (Some((_, b)), ExtremumKind::Min) => value < b,
        };
        if better {
            best = Some((i, value));
        }
    }

    let (index, value) = best.ok_or_else(|| SummaryError::EmptyView {
        metric: metric.id().to_string(),
        kind: kind.to_string(),
    })?;

    let record = &records[index];
    Ok(Extremum {
        procedure: record.procedure.clone(),
        product: record.product.clone(),
        metric,
        kind,
        value,
        index,
    })
}

/// A summary card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineCard {
    pub title: String,
    pub procedure: String,
    pub formatted_value: String,
    pub extremum: Extremum,
}

impl HeadlineCard {
    fn new(title: &str, extremum: Extremum) -> Self {
        Self {
            title: title.to_string(),
            procedure: extremum.procedure.clone(),
            formatted_value: extremum.formatted_value(),
            extremum,
        }
    }
}

/// The four fixed cards of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineMetrics {
    /// Highest charged value
    pub most_expensive: HeadlineCard,
    /// Lowest average unit cost
    pub lowest_unit_cost: HeadlineCard,
    /// Highest average margin
    pub highest_margin: HeadlineCard,
    /// Highest average margin percentage
    pub highest_margin_pct: HeadlineCard,
}

impl HeadlineMetrics {
    pub fn cards(&self) -> [&HeadlineCard; 4] {
        [
            &self.most_expensive,
            &self.lowest_unit_cost,
            &self.highest_margin,
            &self.highest_margin_pct,
        ]
    }
}

/// Run the four headline queries against `view`.
pub fn headline_metrics<S>(view: &S) -> SummaryResult<HeadlineMetrics>
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    Ok(HeadlineMetrics {
        most_expensive: HeadlineCard::new(
            "Most expensive procedure",
            extremum(view, Metric::ChargedValue, ExtremumKind::Max)?,
        ),
        lowest_unit_cost: HeadlineCard::new(
            "Lowest unit cost",
            extremum(view, Metric::AvgUnitCost, ExtremumKind::Min)?,
        ),
        highest_margin: HeadlineCard::new(
            "Highest margin",
            extremum(view, Metric::AvgMargin, ExtremumKind::Max)?,
        ),
        highest_margin_pct: HeadlineCard::new(
            "Highest margin %",
            extremum(view, Metric::AvgMarginPct, ExtremumKind::Max)?,
        ),
    })
}

/// `R$ 1,234.56`; negatives as `-R$ 12.00`.
pub fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}R$ {}.{}", sign, grouped, frac_part)
}

/// `12.34%`
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}
