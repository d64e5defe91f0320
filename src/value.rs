//! Scalar value helpers - coercion, display and date parsing shared by the
//! filter and aggregation passes.

use chrono::NaiveDate;
use serde_json::Value;

/// Render a scalar the way it is shown to the user (and matched by filters).
/// Null/absent values have no display form; callers decide (grouping uses
/// "Unknown", CSV export uses the empty string).
pub fn display_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        // Non-scalar values do not occur in ingested rows.
        other => Some(other.to_string()),
    }
}

/// Numeric coercion following JS `Number()` semantics: numbers pass through,
/// numeric strings parse, booleans map to 0/1, everything else (null,
/// absent, non-numeric text) yields None and is discarded by aggregation.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

/// Parse a cell as a calendar date. Accepts the common date formats plus
/// RFC3339 timestamps (date part only).
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// String form of [`parse_date`], for bounds that arrive as ISO text (e.g.
/// the declared start/end of a date filter).
pub fn parse_date_str(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    None
}
