//! Dashboard configuration models - the versioned unit of undo/redo and the
//! wire format exchanged with the language-model collaborator (camelCase
//! JSON).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The y-axis sentinel meaning "count rows" instead of aggregating a column.
pub const COUNT_AXIS: &str = "count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
    Area,
}

/// Closed set of aggregation kinds. Dispatch happens through an exhaustive
/// match in the aggregation engine, one pure reducer per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Label,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub id: String,
    pub kind: ChartKind,
    #[serde(default)]
    pub title: Option<String>,
    pub x_axis: String,
    /// Column to aggregate, or the literal "count".
    pub y_axis: String,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
    #[serde(default = "default_true")]
    pub allow_cross_filter: bool,
}

impl ChartSpec {
    pub fn counts_rows(&self) -> bool {
        self.y_axis == COUNT_AXIS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiFormat {
    Plain,
    Currency,
    Percentage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSpec {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Column to aggregate, or the literal "count".
    pub metric: String,
    pub aggregation: Aggregation,
    pub format: KpiFormat,
    #[serde(default = "default_decimals")]
    pub decimal_places: usize,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Categorical,
    Range,
    Date,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub id: String,
    pub column: String,
    pub kind: FilterKind,
    pub label: String,
    /// Selectable values for categorical filters.
    #[serde(default)]
    pub options: Vec<String>,
    /// Column bounds for range filters.
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// ISO date bounds for date filters.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// The dashboard configuration: ordered KPIs, charts and filter controls
/// plus free-form metadata. One `DashboardConfig` is one undo/redo snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Why the generator chose this layout; shown to the user.
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub kpis: Vec<KpiSpec>,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

impl DashboardConfig {
    pub fn chart(&self, chart_id: &str) -> Option<&ChartSpec> {
        self.charts.iter().find(|c| c.id == chart_id)
    }

    pub fn filter(&self, filter_id: &str) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.id == filter_id)
    }

    /// Structural validation against the dataset's columns. A config that
    /// fails here is treated as a malformed collaborator response: it is
    /// never pushed into the history.
    pub fn validate(&self, columns: &[String]) -> Result<(), String> {
        let known: HashSet<&str> = columns.iter().map(|c| c.as_str()).collect();
        let mut seen_ids: HashSet<String> = HashSet::new();

        let mut check_id = |id: &str| -> Result<(), String> {
            if id.is_empty() {
                return Err("Empty spec id".to_string());
            }
            if !seen_ids.insert(id.to_string()) {
                return Err(format!("Duplicate spec id: {}", id));
            }
            Ok(())
        };

        for kpi in &self.kpis {
            check_id(&kpi.id)?;
            if kpi.metric != COUNT_AXIS && !known.contains(kpi.metric.as_str()) {
                return Err(format!("KPI {} references unknown column {}", kpi.id, kpi.metric));
            }
        }

        for chart in &self.charts {
            check_id(&chart.id)?;
            if !known.contains(chart.x_axis.as_str()) {
                return Err(format!(
                    "Chart {} references unknown x-axis column {}",
                    chart.id, chart.x_axis
                ));
            }
            if !chart.counts_rows() && !known.contains(chart.y_axis.as_str()) {
                return Err(format!(
                    "Chart {} references unknown y-axis column {}",
                    chart.id, chart.y_axis
                ));
            }
        }

        for filter in &self.filters {
            check_id(&filter.id)?;
            if !known.contains(filter.column.as_str()) {
                return Err(format!(
                    "Filter {} references unknown column {}",
                    filter.id, filter.column
                ));
            }
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_decimals() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_chart() -> ChartSpec {
        ChartSpec {
            id: "c1".to_string(),
            kind: ChartKind::Bar,
            title: None,
            x_axis: "region".to_string(),
            y_axis: "sales".to_string(),
            aggregation: Aggregation::Sum,
            sort_by: None,
            sort_order: None,
            allow_cross_filter: true,
        }
    }

    #[test]
    fn deserializes_camel_case_wire_format() {
        let json = r#"{
            "title": "Sales",
            "kpis": [{"id": "k1", "metric": "sales", "aggregation": "sum", "format": "currency", "decimalPlaces": 2}],
            "charts": [{"id": "c1", "kind": "bar", "xAxis": "region", "yAxis": "count", "aggregation": "count"}],
            "filters": [{"id": "f1", "column": "region", "kind": "categorical", "label": "Region", "options": ["East"]}]
        }"#;
        let config: DashboardConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kpis[0].decimal_places, 2);
        assert!(config.charts[0].counts_rows());
        assert!(config.charts[0].allow_cross_filter);
        assert_eq!(config.filters[0].kind, FilterKind::Categorical);
    }

    #[test]
    fn validates_column_references_and_ids() {
        let columns = vec!["region".to_string(), "sales".to_string()];
        let mut config = DashboardConfig {
            title: String::new(),
            description: String::new(),
            rationale: String::new(),
            kpis: vec![],
            charts: vec![sales_chart()],
            filters: vec![],
        };
        assert!(config.validate(&columns).is_ok());

        config.charts[0].x_axis = "missing".to_string();
        assert!(config.validate(&columns).is_err());

        config.charts[0].x_axis = "region".to_string();
        config.charts.push(sales_chart());
        assert!(config.validate(&columns).is_err()); // duplicate id
    }
}
