//! Record builders shared by the transform tests.

use crate::config::MissingValuePolicy;
use crate::models::{ProcedureRecord, RawRecord};
use crate::transform::metrics::derive_row;

/// A record with fixed site values and the given charged value.
pub fn record(procedure: &str, product: &str, charged_value: f64) -> ProcedureRecord {
    record_with(procedure, product, charged_value, (100.0, 120.0), (0.3, 0.35), (50.0, 60.0))
}

/// A record with explicit site pairs: margins, margin ratios, unit costs.
pub fn record_with(
    procedure: &str,
    product: &str,
    charged_value: f64,
    margin: (f64, f64),
    margin_pct: (f64, f64),
    unit_cost: (f64, f64),
) -> ProcedureRecord {
    let raw = RawRecord {
        row: 2,
        procedure: Some(procedure.to_string()),
        product: Some(product.to_string()),
        charged_value: Some(charged_value),
        margin_location_a: Some(margin.0),
        margin_location_b: Some(margin.1),
        margin_pct_location_a: Some(margin_pct.0),
        margin_pct_location_b: Some(margin_pct.1),
        unit_cost_location_a: Some(unit_cost.0),
        unit_cost_location_b: Some(unit_cost.1),
    };
    derive_row(&raw, MissingValuePolicy::Reject).expect("complete row")
}
