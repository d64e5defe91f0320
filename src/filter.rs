//! Filter Engine - declarative filters plus the exclusive cross-filter,
//! composed with logical AND over the in-memory rows.

use crate::config::{FilterKind, FilterSpec};
use crate::dataset::Row;
use crate::value::{coerce_numeric, display_string, parse_date, parse_date_str};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Current value of one filter control. A missing entry in the state map
/// means "no restriction"; so do an empty selection and a range covering
/// the control's declared bounds (see [`is_no_restriction`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FilterValue {
    Selection { values: Vec<String> },
    Range { min: f64, max: f64 },
    DateRange {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

/// True when `value` cannot restrict the column given the bounds its spec
/// declares, so the entry is semantically "no restriction" and must not
/// exclude any row (not even rows with null or unparseable cells): an empty
/// categorical selection, a numeric range covering the declared min/max, or
/// a date range covering the declared start/end (a missing side is open).
pub fn is_no_restriction(spec: &FilterSpec, value: &FilterValue) -> bool {
    match value {
        FilterValue::Selection { values } => values.is_empty(),
        FilterValue::Range { min, max } => match (spec.min, spec.max) {
            (Some(lo), Some(hi)) => *min <= lo && *max >= hi,
            _ => false,
        },
        FilterValue::DateRange { start, end } => {
            let declared_start = spec.start.as_deref().and_then(parse_date_str);
            let declared_end = spec.end.as_deref().and_then(parse_date_str);
            let start_open = match (start, declared_start) {
                (None, _) => true,
                (Some(s), Some(d)) => *s <= d,
                (Some(_), None) => false,
            };
            let end_open = match (end, declared_end) {
                (None, _) => true,
                (Some(e), Some(d)) => *e >= d,
                (Some(_), None) => false,
            };
            start_open && end_open
        }
    }
}

/// FilterSpec id -> current value.
pub type FilterState = HashMap<String, FilterValue>;

/// Drill-down created by clicking a chart element. At most one is active;
/// a new click on any chart replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossFilter {
    pub source_chart_id: String,
    pub column: String,
    pub value: String,
}

/// Apply every active filter plus the cross-filter to the rows. Pure; the
/// result preserves input order. Malformed or missing cell values simply
/// fail the corresponding predicate.
pub fn compute_visible_rows(
    rows: &[Row],
    filter_specs: &[FilterSpec],
    state: &FilterState,
    cross_filter: Option<&CrossFilter>,
) -> Vec<Row> {
    rows.iter()
        .filter(|row| row_passes(row, filter_specs, state, cross_filter))
        .cloned()
        .collect()
}

fn row_passes(
    row: &Row,
    filter_specs: &[FilterSpec],
    state: &FilterState,
    cross_filter: Option<&CrossFilter>,
) -> bool {
    for spec in filter_specs {
        let Some(value) = state.get(&spec.id) else {
            continue;
        };
        if is_no_restriction(spec, value) {
            continue;
        }
        if !matches_filter(row, spec, value) {
            return false;
        }
    }

    if let Some(cross) = cross_filter {
        let cell = row.get(&cross.column).unwrap_or(&Value::Null);
        return match display_string(cell) {
            Some(text) => text == cross.value,
            None => false,
        };
    }

    true
}

fn matches_filter(row: &Row, spec: &FilterSpec, value: &FilterValue) -> bool {
    let cell = row.get(&spec.column).unwrap_or(&Value::Null);

    match (spec.kind, value) {
        (FilterKind::Categorical, FilterValue::Selection { values }) => match display_string(cell) {
            Some(text) => values.contains(&text),
            None => false,
        },
        (FilterKind::Range, FilterValue::Range { min, max }) => match coerce_numeric(cell) {
            Some(number) => number >= *min && number <= *max,
            None => false,
        },
        (FilterKind::Date, FilterValue::DateRange { start, end }) => match parse_date(cell) {
            Some(date) => {
                start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
            }
            None => false,
        },
        // State value of the wrong shape for the spec: treat as no match
        // rather than erroring; the engine never raises from filtering.
        _ => false,
    }
}
