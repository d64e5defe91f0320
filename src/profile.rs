//! Column profiling - deterministic semantic-type inference and summary
//! statistics, computed once at ingestion.

use crate::dataset::Row;
use crate::value::{coerce_numeric, display_string, parse_date};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Share of non-null values that must parse for a column to be classified
/// numeric or datetime.
const TYPE_PARSE_THRESHOLD: f64 = 0.8;

/// Entries kept in the categorical top-values histogram.
const TOP_VALUES_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub q1: f64,
    pub q3: f64,
    pub skewness: f64,
    /// Excess kurtosis (normal distribution = 0).
    pub kurtosis: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopValue {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalStats {
    /// Most frequent values, descending by count (ties by value for
    /// determinism), capped at 10 entries.
    pub top_values: Vec<TopValue>,
    /// Shannon entropy in bits over the value distribution.
    pub entropy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub semantic_type: SemanticType,
    pub null_count: usize,
    pub null_percent: f64,
    pub distinct_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorical: Option<CategoricalStats>,
}

/// Profile every column of the dataset. Full-column scan; the upload bound
/// keeps this affordable.
pub fn profile_columns(columns: &[String], rows: &[Row]) -> Vec<ColumnMetadata> {
    columns
        .iter()
        .map(|column| profile_column(column, rows))
        .collect()
}

fn profile_column(column: &str, rows: &[Row]) -> ColumnMetadata {
    let values: Vec<&Value> = rows
        .iter()
        .map(|row| row.get(column).unwrap_or(&Value::Null))
        .collect();

    let total = values.len();
    let non_null: Vec<&Value> = values
        .iter()
        .copied()
        .filter(|v| !v.is_null())
        .collect();
    let null_count = total - non_null.len();
    let null_percent = if total == 0 {
        0.0
    } else {
        null_count as f64 / total as f64 * 100.0
    };

    let distinct_count = non_null
        .iter()
        .filter_map(|&v| display_string(v))
        .unique()
        .count();

    let semantic_type = infer_type(&non_null, distinct_count);

    let numeric = if semantic_type == SemanticType::Numeric {
        let numbers: Vec<f64> = non_null.iter().filter_map(|&v| coerce_numeric(v)).collect();
        numeric_stats(&numbers)
    } else {
        None
    };

    let categorical = if semantic_type == SemanticType::Categorical {
        Some(categorical_stats(&non_null))
    } else {
        None
    };

    ColumnMetadata {
        name: column.to_string(),
        semantic_type,
        null_count,
        null_percent,
        distinct_count,
        numeric,
        categorical,
    }
}

fn infer_type(non_null: &[&Value], distinct_count: usize) -> SemanticType {
    if non_null.is_empty() {
        return SemanticType::Text;
    }

    let is_boolish = |v: &Value| match v {
        Value::Bool(_) => true,
        Value::String(s) => {
            s.trim().eq_ignore_ascii_case("true") || s.trim().eq_ignore_ascii_case("false")
        }
        _ => false,
    };
    if non_null.iter().all(|&v| is_boolish(v)) {
        return SemanticType::Boolean;
    }

    let count = non_null.len() as f64;
    let numeric_hits = non_null.iter().filter(|&&v| coerce_numeric(v).is_some()).count() as f64;
    if numeric_hits / count >= TYPE_PARSE_THRESHOLD {
        return SemanticType::Numeric;
    }

    let date_hits = non_null.iter().filter(|&&v| parse_date(v).is_some()).count() as f64;
    if date_hits / count >= TYPE_PARSE_THRESHOLD {
        return SemanticType::Datetime;
    }

    let categorical_limit = 20.max(non_null.len() / 10);
    if distinct_count <= categorical_limit {
        SemanticType::Categorical
    } else {
        SemanticType::Text
    }
}

fn numeric_stats(numbers: &[f64]) -> Option<NumericStats> {
    if numbers.is_empty() {
        return None;
    }

    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;

    let mut sorted = numbers.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let m2 = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let m3 = numbers.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
    let m4 = numbers.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n;
    let std_dev = m2.sqrt();

    let skewness = if m2 > 0.0 { m3 / m2.powf(1.5) } else { 0.0 };
    let kurtosis = if m2 > 0.0 { m4 / (m2 * m2) - 3.0 } else { 0.0 };

    Some(NumericStats {
        mean,
        median: percentile(&sorted, 0.5),
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        q1: percentile(&sorted, 0.25),
        q3: percentile(&sorted, 0.75),
        skewness,
        kurtosis,
    })
}

/// Linear-interpolation percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let weight = rank - low as f64;
        sorted[low] * (1.0 - weight) + sorted[high] * weight
    }
}

fn categorical_stats(non_null: &[&Value]) -> CategoricalStats {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for &value in non_null {
        if let Some(text) = display_string(value) {
            *counts.entry(text).or_insert(0) += 1;
        }
    }

    let total: usize = counts.values().sum();
    let entropy = if total == 0 {
        0.0
    } else {
        counts
            .values()
            .map(|&c| {
                let p = c as f64 / total as f64;
                -p * p.log2()
            })
            .sum()
    };

    let top_values = counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(TOP_VALUES_LIMIT)
        .map(|(value, count)| TopValue { value, count })
        .collect();

    CategoricalStats { top_values, entropy }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows_of(column: &str, values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| {
                let mut row = Row::new();
                row.insert(column.to_string(), v);
                row
            })
            .collect()
    }

    #[test]
    fn infers_numeric_with_stats() {
        let rows = rows_of("amount", vec![json!(1), json!(2), json!(3), json!(4)]);
        let meta = &profile_columns(&["amount".to_string()], &rows)[0];
        assert_eq!(meta.semantic_type, SemanticType::Numeric);
        let stats = meta.numeric.as_ref().unwrap();
        assert!((stats.mean - 2.5).abs() < 1e-9);
        assert!((stats.median - 2.5).abs() < 1e-9);
        assert!((stats.min - 1.0).abs() < 1e-9);
        assert!((stats.max - 4.0).abs() < 1e-9);
        // Symmetric distribution has zero skew.
        assert!(stats.skewness.abs() < 1e-9);
    }

    #[test]
    fn infers_categorical_with_entropy() {
        let rows = rows_of(
            "region",
            vec![json!("East"), json!("East"), json!("West"), json!("West")],
        );
        let meta = &profile_columns(&["region".to_string()], &rows)[0];
        assert_eq!(meta.semantic_type, SemanticType::Categorical);
        let stats = meta.categorical.as_ref().unwrap();
        // Two equally likely values: one bit of entropy.
        assert!((stats.entropy - 1.0).abs() < 1e-9);
        assert_eq!(stats.top_values.len(), 2);
        assert_eq!(stats.top_values[0].count, 2);
    }

    #[test]
    fn infers_boolean_and_datetime() {
        let rows = rows_of("active", vec![json!(true), json!("false"), json!(true)]);
        let meta = &profile_columns(&["active".to_string()], &rows)[0];
        assert_eq!(meta.semantic_type, SemanticType::Boolean);

        let rows = rows_of(
            "day",
            vec![json!("2024-01-01"), json!("2024-01-02"), json!("2024-01-03")],
        );
        let meta = &profile_columns(&["day".to_string()], &rows)[0];
        assert_eq!(meta.semantic_type, SemanticType::Datetime);
    }

    #[test]
    fn counts_nulls_and_distincts() {
        let rows = rows_of(
            "c",
            vec![json!("a"), Value::Null, json!("a"), json!("b")],
        );
        let meta = &profile_columns(&["c".to_string()], &rows)[0];
        assert_eq!(meta.null_count, 1);
        assert!((meta.null_percent - 25.0).abs() < 1e-9);
        assert_eq!(meta.distinct_count, 2);
    }
}
