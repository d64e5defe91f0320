//! Aggregation Engine - groups filtered rows into chart buckets and KPI
//! scalars. Never errors: absent or invalid data degrades to 0-valued
//! output, favoring availability over strictness.

use crate::config::{Aggregation, ChartSpec, KpiFormat, KpiSpec, SortBy, SortOrder};
use crate::dataset::Row;
use crate::value::{coerce_numeric, display_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Distinct labels kept verbatim before the remainder collapses into the
/// "Others (n)" bucket.
pub const MAX_BUCKETS: usize = 10;

/// Fixed palette cycled by bucket position.
pub const PALETTE: [&str; 10] = [
    "#4E79A7", "#F28E2B", "#E15759", "#76B7B2", "#59A14F",
    "#EDC948", "#B07AA1", "#FF9DA7", "#9C755F", "#BAB0AC",
];

/// Color index reserved for the "Others" bucket, outside the palette cycle.
pub const OTHERS_COLOR_INDEX: usize = PALETTE.len();

/// Neutral color rendered for `OTHERS_COLOR_INDEX`.
pub const OTHERS_COLOR: &str = "#9CA3AF";

/// Label used for rows whose x-axis value is null or absent.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// One displayed chart unit: a distinct x-axis group or the merged Others
/// group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub label: String,
    pub value: f64,
    /// Share of the displayed total, in percent. Always computed over what
    /// is shown, not the unfiltered dataset.
    pub percent: f64,
    pub color_index: usize,
}

impl Bucket {
    /// Hex color to render this bucket with: the palette entry for its
    /// index, or the neutral Others color for the out-of-palette index.
    pub fn color(&self) -> &'static str {
        if self.color_index >= PALETTE.len() {
            OTHERS_COLOR
        } else {
            PALETTE[self.color_index]
        }
    }
}

/// A computed KPI: the raw scalar and its display form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiValue {
    pub id: String,
    pub label: Option<String>,
    pub raw: f64,
    pub formatted: String,
}

/// Reducer for one aggregation kind. `values` holds the numeric
/// contributions after non-numeric discard; `row_count` is the pre-discard
/// size of the group.
fn reduce(aggregation: Aggregation, values: &[f64], row_count: usize) -> f64 {
    match aggregation {
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Avg => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        Aggregation::Count => row_count as f64,
        Aggregation::Min => values.iter().copied().reduce(f64::min).unwrap_or(0.0),
        Aggregation::Max => values.iter().copied().reduce(f64::max).unwrap_or(0.0),
        Aggregation::Median => median(values),
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Aggregate rows into ordered, colored buckets for one chart.
///
/// When more than 10 distinct labels exist, the first 10 post-sort entries
/// are kept and the rest merge into an "Others (n)" bucket whose value is
/// always the SUM of the merged values, even for avg/median charts. That
/// asymmetry is long-standing observed behavior and is kept deliberately.
pub fn aggregate_for_chart(rows: &[Row], chart: &ChartSpec) -> Vec<Bucket> {
    // Group by stringified x value, preserving first-seen order so that
    // sorting ties stay deterministic.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (Vec<f64>, usize)> = HashMap::new();

    for row in rows {
        let cell = row.get(&chart.x_axis).unwrap_or(&Value::Null);
        let label = display_string(cell).unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        let entry = groups.entry(label.clone()).or_insert_with(|| {
            order.push(label.clone());
            (Vec::new(), 0)
        });
        entry.1 += 1;

        if chart.counts_rows() {
            entry.0.push(1.0);
        } else if let Some(number) = coerce_numeric(row.get(&chart.y_axis).unwrap_or(&Value::Null)) {
            entry.0.push(number);
        }
    }

    let mut pairs: Vec<(String, f64)> = order
        .into_iter()
        .map(|label| {
            let (values, row_count) = &groups[&label];
            let value = reduce(chart.aggregation, values, *row_count);
            (label, value)
        })
        .collect();

    sort_pairs(&mut pairs, chart.sort_by, chart.sort_order);

    let mut buckets: Vec<Bucket> = Vec::new();
    if pairs.len() > MAX_BUCKETS {
        let merged = pairs.split_off(MAX_BUCKETS);
        for (position, (label, value)) in pairs.into_iter().enumerate() {
            buckets.push(Bucket {
                label,
                value,
                percent: 0.0,
                color_index: position % PALETTE.len(),
            });
        }
        let merged_count = merged.len();
        let merged_sum: f64 = merged.iter().map(|(_, v)| v).sum();
        buckets.push(Bucket {
            label: format!("Others ({})", merged_count),
            value: merged_sum,
            percent: 0.0,
            color_index: OTHERS_COLOR_INDEX,
        });
    } else {
        for (position, (label, value)) in pairs.into_iter().enumerate() {
            buckets.push(Bucket {
                label,
                value,
                percent: 0.0,
                color_index: position % PALETTE.len(),
            });
        }
    }

    let displayed_total: f64 = buckets.iter().map(|b| b.value).sum();
    for bucket in &mut buckets {
        bucket.percent = if displayed_total == 0.0 {
            0.0
        } else {
            bucket.value / displayed_total * 100.0
        };
    }

    buckets
}

fn sort_pairs(pairs: &mut [(String, f64)], sort_by: Option<SortBy>, sort_order: Option<SortOrder>) {
    match sort_by {
        Some(SortBy::Label) => {
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            if sort_order == Some(SortOrder::Desc) {
                pairs.reverse();
            }
        }
        // Value sort is the default and sorts highest-first unless asc is
        // requested.
        _ => {
            pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            if sort_order == Some(SortOrder::Asc) {
                pairs.reverse();
            }
        }
    }
}

/// Compute one KPI over the filtered rows: a single implicit group covering
/// every row, then the same contribution and reducer rules as charts.
pub fn compute_kpi(rows: &[Row], kpi: &KpiSpec) -> KpiValue {
    let row_count = rows.len();
    let values: Vec<f64> = if kpi.metric == crate::config::COUNT_AXIS {
        vec![1.0; row_count]
    } else {
        rows.iter()
            .filter_map(|row| coerce_numeric(row.get(&kpi.metric).unwrap_or(&Value::Null)))
            .collect()
    };

    let raw = reduce(kpi.aggregation, &values, row_count);
    let formatted = format_kpi(raw, kpi);

    KpiValue {
        id: kpi.id.clone(),
        label: kpi.label.clone(),
        raw,
        formatted,
    }
}

fn format_kpi(value: f64, kpi: &KpiSpec) -> String {
    let body = match kpi.format {
        KpiFormat::Plain => abbreviate(value, kpi.decimal_places),
        KpiFormat::Currency => {
            let sign = if value < 0.0 { "-" } else { "" };
            format!("{}${}", sign, group_thousands(value.abs(), kpi.decimal_places))
        }
        KpiFormat::Percentage => format!("{:.*}%", kpi.decimal_places, value),
    };

    format!(
        "{}{}{}",
        kpi.prefix.as_deref().unwrap_or(""),
        body,
        kpi.suffix.as_deref().unwrap_or("")
    )
}

/// Plain-format abbreviation: 1,234,567 -> "1.2M", 12,345 -> "12.3K",
/// otherwise fixed decimal places.
fn abbreviate(value: f64, decimal_places: usize) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{:.*}", decimal_places, value)
    }
}

fn group_thousands(value: f64, decimal_places: usize) -> String {
    let fixed = format!("{:.*}", decimal_places, value);
    let (integer_part, fraction_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed, None),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = integer_part.chars().collect();
    for (idx, ch) in digits.iter().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*ch);
    }

    match fraction_part {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChartKind, COUNT_AXIS};
    use serde_json::json;

    fn row(region: &str, sales: Value) -> Row {
        let mut r = Row::new();
        r.insert("region".to_string(), json!(region));
        r.insert("sales".to_string(), sales);
        r
    }

    fn chart(aggregation: Aggregation) -> ChartSpec {
        ChartSpec {
            id: "c1".to_string(),
            kind: ChartKind::Bar,
            title: None,
            x_axis: "region".to_string(),
            y_axis: "sales".to_string(),
            aggregation,
            sort_by: None,
            sort_order: None,
            allow_cross_filter: true,
        }
    }

    #[test]
    fn sums_by_group_in_descending_order() {
        let rows = vec![
            row("East", json!(10)),
            row("West", json!(20)),
            row("East", json!(5)),
        ];
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].label, "West");
        assert!((buckets[0].value - 20.0).abs() < 1e-9);
        assert!((buckets[0].percent - 57.142857).abs() < 0.01);
        assert_eq!(buckets[1].label, "East");
        assert!((buckets[1].value - 15.0).abs() < 1e-9);
        assert!((buckets[1].percent - 42.857142).abs() < 0.01);
    }

    #[test]
    fn percents_sum_to_one_hundred() {
        let rows: Vec<Row> = (0..7)
            .map(|i| row(&format!("r{}", i % 3), json!(i + 1)))
            .collect();
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        let total: f64 = buckets.iter().map(|b| b.percent).sum();
        assert!((total - 100.0).abs() < 0.01);
    }

    #[test]
    fn zero_total_yields_zero_percents() {
        let rows = vec![row("East", json!(0)), row("West", json!(0))];
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        assert!(buckets.iter().all(|b| b.percent == 0.0));
    }

    #[test]
    fn null_x_values_group_under_unknown() {
        let rows = vec![row("East", json!(10)), {
            let mut r = Row::new();
            r.insert("sales".to_string(), json!(4));
            r
        }];
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        assert!(buckets.iter().any(|b| b.label == UNKNOWN_LABEL && b.value == 4.0));
    }

    #[test]
    fn non_numeric_contributions_are_discarded_not_zeroed() {
        let rows = vec![
            row("East", json!(10)),
            row("East", json!("oops")),
            row("East", json!(20)),
        ];
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Avg));
        // Average of [10, 20], not [10, 0, 20].
        assert!((buckets[0].value - 15.0).abs() < 1e-9);
    }

    #[test]
    fn count_uses_pre_discard_row_count() {
        let rows = vec![row("East", json!("oops")), row("East", json!(1))];
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Count));
        assert!((buckets[0].value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn count_axis_counts_rows() {
        let mut spec = chart(Aggregation::Sum);
        spec.y_axis = COUNT_AXIS.to_string();
        let rows = vec![row("East", json!(1)), row("East", json!(2)), row("West", json!(3))];
        let buckets = aggregate_for_chart(&rows, &spec);
        assert_eq!(buckets[0].label, "East");
        assert!((buckets[0].value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn median_averages_central_pair() {
        assert!((median(&[1.0, 2.0, 3.0, 4.0]) - 2.5).abs() < 1e-9);
        assert!((median(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-9);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn min_max_reducers() {
        let rows = vec![row("East", json!(7)), row("East", json!(3)), row("East", json!(9))];
        let min = aggregate_for_chart(&rows, &chart(Aggregation::Min));
        assert!((min[0].value - 3.0).abs() < 1e-9);
        let max = aggregate_for_chart(&rows, &chart(Aggregation::Max));
        assert!((max[0].value - 9.0).abs() < 1e-9);
    }

    #[test]
    fn eleven_labels_collapse_to_ten_plus_others() {
        let rows: Vec<Row> = (0..11).map(|i| row(&format!("r{:02}", i), json!(100 - i))).collect();
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        assert_eq!(buckets.len(), 11);
        assert_eq!(buckets[10].label, "Others (1)");
        assert_eq!(buckets[10].color_index, OTHERS_COLOR_INDEX);
        // Lowest value (100 - 10 = 90) was merged.
        assert!((buckets[10].value - 90.0).abs() < 1e-9);
    }

    #[test]
    fn bucket_colors_cycle_palette_and_neutralize_others() {
        let rows: Vec<Row> = (0..11).map(|i| row(&format!("r{:02}", i), json!(100 - i))).collect();
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        assert_eq!(buckets[0].color(), PALETTE[0]);
        assert_eq!(buckets[9].color(), PALETTE[9]);
        assert_eq!(buckets[10].color(), OTHERS_COLOR);
    }

    #[test]
    fn ten_labels_have_no_others_bucket() {
        let rows: Vec<Row> = (0..10).map(|i| row(&format!("r{}", i), json!(1))).collect();
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Sum));
        assert_eq!(buckets.len(), 10);
        assert!(buckets.iter().all(|b| !b.label.starts_with("Others")));
    }

    #[test]
    fn others_bucket_sums_even_for_avg_charts() {
        // 12 groups of a single row each; avg per group equals the value.
        let rows: Vec<Row> = (0..12).map(|i| row(&format!("r{:02}", i), json!(12 - i))).collect();
        let buckets = aggregate_for_chart(&rows, &chart(Aggregation::Avg));
        assert_eq!(buckets.len(), 11);
        // Merged groups hold values 2 and 1; Others is their sum, not average.
        assert_eq!(buckets[10].label, "Others (2)");
        assert!((buckets[10].value - 3.0).abs() < 1e-9);
    }

    #[test]
    fn label_sort_is_lexicographic() {
        let rows = vec![row("b", json!(1)), row("a", json!(2)), row("c", json!(3))];
        let mut spec = chart(Aggregation::Sum);
        spec.sort_by = Some(SortBy::Label);
        let buckets = aggregate_for_chart(&rows, &spec);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);

        spec.sort_order = Some(SortOrder::Desc);
        let buckets = aggregate_for_chart(&rows, &spec);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "b", "a"]);
    }

    #[test]
    fn value_sort_ascending_when_requested() {
        let rows = vec![row("a", json!(3)), row("b", json!(1)), row("c", json!(2))];
        let mut spec = chart(Aggregation::Sum);
        spec.sort_order = Some(SortOrder::Asc);
        let buckets = aggregate_for_chart(&rows, &spec);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "c", "a"]);
    }

    #[test]
    fn empty_groups_degrade_to_zero() {
        let rows = vec![row("East", json!("bad"))];
        for aggregation in [
            Aggregation::Sum,
            Aggregation::Avg,
            Aggregation::Min,
            Aggregation::Max,
            Aggregation::Median,
        ] {
            let buckets = aggregate_for_chart(&rows, &chart(aggregation));
            assert_eq!(buckets[0].value, 0.0, "{:?}", aggregation);
        }
    }

    fn kpi(format: KpiFormat, decimals: usize) -> KpiSpec {
        KpiSpec {
            id: "k1".to_string(),
            label: None,
            metric: "sales".to_string(),
            aggregation: Aggregation::Sum,
            format,
            decimal_places: decimals,
            prefix: None,
            suffix: None,
        }
    }

    #[test]
    fn kpi_plain_abbreviates_large_values() {
        let rows = vec![row("East", json!(2_500_000))];
        let value = compute_kpi(&rows, &kpi(KpiFormat::Plain, 1));
        assert_eq!(value.formatted, "2.5M");

        let rows = vec![row("East", json!(12_340))];
        let value = compute_kpi(&rows, &kpi(KpiFormat::Plain, 1));
        assert_eq!(value.formatted, "12.3K");

        let rows = vec![row("East", json!(42))];
        let value = compute_kpi(&rows, &kpi(KpiFormat::Plain, 2));
        assert_eq!(value.formatted, "42.00");
    }

    #[test]
    fn kpi_currency_groups_thousands_without_abbreviation() {
        let rows = vec![row("East", json!(1234567.891))];
        let value = compute_kpi(&rows, &kpi(KpiFormat::Currency, 2));
        assert_eq!(value.formatted, "$1,234,567.89");
    }

    #[test]
    fn kpi_percentage_and_affixes() {
        let rows = vec![row("East", json!(42.1234))];
        let mut spec = kpi(KpiFormat::Percentage, 1);
        spec.prefix = Some("~".to_string());
        spec.suffix = Some(" YoY".to_string());
        let value = compute_kpi(&rows, &spec);
        assert_eq!(value.formatted, "~42.1% YoY");
    }

    #[test]
    fn kpi_count_metric_counts_rows() {
        let rows = vec![row("East", json!(1)), row("West", json!(2))];
        let mut spec = kpi(KpiFormat::Plain, 0);
        spec.metric = COUNT_AXIS.to_string();
        spec.aggregation = Aggregation::Count;
        let value = compute_kpi(&rows, &spec);
        assert_eq!(value.raw, 2.0);
        assert_eq!(value.formatted, "2");
    }
}
