//! Metric Calculator: derive the per-row averages.
//!
//! Each derived field is the mean of the same field at the two operating
//! sites. Absent site values are handled by [`MissingValuePolicy`].

use crate::api::logs::log_warning;
use crate::config::MissingValuePolicy;
use crate::error::{DataSourceError, DataSourceResult};
use crate::models::{ProcedureRecord, RawRecord};

/// Mean of two values.
pub fn mean2(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

/// Build augmented records from raw rows.
///
/// Pure: the input is never modified. Under [`MissingValuePolicy::DropRow`]
/// incomplete rows are left out (and logged); every other policy keeps the
/// row count or fails.
pub fn derive_metrics(
    raw: &[RawRecord],
    policy: MissingValuePolicy,
) -> DataSourceResult<Vec<ProcedureRecord>> {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = Vec::new();

    for row in raw {
        match derive_row(row, policy) {
            Ok(record) => records.push(record),
            Err(DataSourceError::MissingValue { row, .. })
                if policy == MissingValuePolicy::DropRow =>
            {
                dropped.push(row)
            }
            Err(e) => return Err(e),
        }
    }

    if !dropped.is_empty() {
        let sample: Vec<String> = dropped.iter().take(5).map(|r| r.to_string()).collect();
        let more = if dropped.len() > 5 {
            format!("... +{}", dropped.len() - 5)
        } else {
            String::new()
        };
        log_warning(format!(
            "{} rows dropped for missing values (rows: {}{})",
            dropped.len(),
            sample.join(", "),
            more
        ));
    }

    Ok(records)
}

/// Derive one record. Missing labels always fail; see [`site_mean`] for numbers.
pub fn derive_row(raw: &RawRecord, policy: MissingValuePolicy) -> DataSourceResult<ProcedureRecord> {
    let missing = |column: &str| DataSourceError::MissingValue {
        row: raw.row,
        column: column.to_string(),
    };

    let procedure = raw.procedure.clone().ok_or_else(|| missing("procedure"))?;
    let product = raw.product.clone().ok_or_else(|| missing("product"))?;

    let charged_value = match (raw.charged_value, policy) {
        (Some(v), _) => v,
        (None, MissingValuePolicy::TreatAsZero) => 0.0,
        (None, _) => return Err(missing("charged_value")),
    };

    let avg_margin = site_mean(
        raw.margin_location_a,
        raw.margin_location_b,
        policy,
        raw.row,
        "margin",
    )?;
    let avg_pct = site_mean(
        raw.margin_pct_location_a,
        raw.margin_pct_location_b,
        policy,
        raw.row,
        "margin_pct",
    )?;
    let avg_unit_cost = site_mean(
        raw.unit_cost_location_a,
        raw.unit_cost_location_b,
        policy,
        raw.row,
        "unit_cost",
    )?;

    Ok(ProcedureRecord {
        procedure,
        product,
        charged_value,
        margin_location_a: raw.margin_location_a,
        margin_location_b: raw.margin_location_b,
        margin_pct_location_a: raw.margin_pct_location_a,
        margin_pct_location_b: raw.margin_pct_location_b,
        unit_cost_location_a: raw.unit_cost_location_a,
        unit_cost_location_b: raw.unit_cost_location_b,
        avg_margin,
        avg_margin_pct: avg_pct * 100.0,
        avg_unit_cost,
    })
}

/// Mean of a pair of site values under `policy`.
///
/// Under `SkipMissing` the mean is the present side alone. The site values
/// themselves are never filled in.
fn site_mean(
    a: Option<f64>,
    b: Option<f64>,
    policy: MissingValuePolicy,
    row: usize,
    field: &str,
) -> DataSourceResult<f64> {
    let missing = |side: &str| DataSourceError::MissingValue {
        row,
        column: format!("{}_location_{}", field, side),
    };

    match (a, b, policy) {
        (Some(a), Some(b), _) => Ok(mean2(a, b)),
        (a, b, MissingValuePolicy::TreatAsZero) => Ok(mean2(a.unwrap_or(0.0), b.unwrap_or(0.0))),
        (Some(v), None, MissingValuePolicy::SkipMissing)
        | (None, Some(v), MissingValuePolicy::SkipMissing) => Ok(v),
        (None, _, _) => Err(missing("a")),
        (_, None, _) => Err(missing("b")),
    }
}
