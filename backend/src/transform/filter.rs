//! Filter Engine: restrict rows to the selected procedures.

use std::collections::HashSet;

use crate::models::{FilteredView, ProcedureRecord};

/// Keep rows whose procedure is in `selected`, in source order.
///
/// Works on a [`crate::models::ProcedureTable`] or on an existing
/// [`FilteredView`]; filtering a view by a superset of the selection that
/// produced it returns the same rows. An empty selection gives an empty view.
pub fn filter_procedures<S>(source: &S, selected: &HashSet<String>) -> FilteredView
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    let records = source
        .as_ref()
        .iter()
        .filter(|r| selected.contains(&r.procedure))
        .cloned()
        .collect();

    FilteredView::new(records)
}

/// The whole source as a view, for "everything selected".
pub fn select_all<S>(source: &S) -> FilteredView
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    FilteredView::new(source.as_ref().to_vec())
}

/// Distinct procedures in order of first appearance.
pub fn distinct_procedures<S>(source: &S) -> Vec<String>
where
    S: AsRef<[ProcedureRecord]> + ?Sized,
{
    let mut seen = HashSet::new();
    let mut procedures = Vec::new();
    for record in source.as_ref() {
        if seen.insert(record.procedure.as_str()) {
            procedures.push(record.procedure.clone());
        }
    }
    procedures
}
