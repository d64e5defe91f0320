//! Language-model collaborator - turns natural-language instructions into
//! dashboard configurations. The HTTP client is the engine's only
//! suspension point; everything downstream of it is synchronous.

use crate::config::{
    Aggregation, ChartKind, ChartSpec, DashboardConfig, FilterKind, FilterSpec, KpiFormat, KpiSpec,
    COUNT_AXIS,
};
use crate::dataset::Dataset;
use crate::error::{DashboardError, Result};
use crate::profile::SemanticType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A successful modification: the replacement config plus human-readable
/// change descriptions for the history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationOutcome {
    pub config: DashboardConfig,
    #[serde(default)]
    pub changes: Vec<String>,
}

/// Seam for the natural-language-to-config transformer so the orchestrator
/// and tests do not depend on the network client.
#[async_trait]
pub trait DashboardModifier: Send + Sync {
    async fn modify(
        &self,
        config: &DashboardConfig,
        instruction: &str,
    ) -> Result<ModificationOutcome>;
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Generate an initial dashboard for a dataset, optionally steered by
    /// free-text requirements. Falls back to the deterministic heuristic
    /// layout when no API key is configured.
    pub async fn generate_dashboard(
        &self,
        dataset: &Dataset,
        requirements: Option<&str>,
    ) -> Result<DashboardConfig> {
        if self.api_key.is_empty() {
            tracing::info!("No API key configured; using heuristic dashboard generation");
            return Ok(default_dashboard(dataset));
        }

        let profile = serde_json::to_string_pretty(&dataset.metadata)?;
        let prompt = format!(
            r#"You are a dashboard designer. Given the column profile of a dataset, design a dashboard configuration.

Dataset: "{}" ({} rows)
Column profile:
{}

User requirements: {}

Return ONLY a JSON object with this shape (camelCase keys):
{{
  "title": "Sales Overview",
  "description": "…",
  "rationale": "why this layout fits the data",
  "kpis": [{{"id": "kpi_1", "label": "Total Sales", "metric": "sales", "aggregation": "sum", "format": "currency", "decimalPlaces": 2}}],
  "charts": [{{"id": "chart_1", "kind": "bar", "title": "Sales by Region", "xAxis": "region", "yAxis": "sales", "aggregation": "sum"}}],
  "filters": [{{"id": "filter_1", "column": "region", "kind": "categorical", "label": "Region", "options": ["East", "West"]}}]
}}

Rules:
- aggregation is one of: sum, avg, count, min, max, median
- chart kind is one of: bar, line, pie, scatter, area
- filter kind is one of: categorical, range, date
- yAxis/metric may be the literal "count" to count rows
- every referenced column must exist in the profile
- at most 4 KPIs, 4 charts and 4 filters

Only return the JSON, no other text."#,
            dataset.name,
            dataset.row_count(),
            profile,
            requirements.unwrap_or("none")
        );

        let response = self.call_llm(&prompt).await?;
        let config: DashboardConfig = serde_json::from_str(strip_code_fences(&response))
            .map_err(|e| DashboardError::Llm(format!("Failed to parse generated config: {}", e)))?;
        Ok(config)
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a precise JSON-only responder. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 2000
        });

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DashboardError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DashboardError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| DashboardError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl DashboardModifier for LlmClient {
    async fn modify(
        &self,
        config: &DashboardConfig,
        instruction: &str,
    ) -> Result<ModificationOutcome> {
        let current = serde_json::to_string_pretty(config)?;
        let prompt = format!(
            r#"You are a dashboard editor. Apply the user's instruction to the current dashboard configuration.

Current configuration:
{}

Instruction: "{}"

Return ONLY a JSON object:
{{
  "config": {{ ...the complete updated configuration, same schema as the input... }},
  "changes": ["Changed chart_1 to a pie chart"]
}}

Rules:
- return the WHOLE configuration, not a diff
- keep ids stable for elements you did not change
- "changes" lists each applied change as a short human-readable sentence
- aggregation is one of: sum, avg, count, min, max, median; chart kind one of: bar, line, pie, scatter, area

Only return the JSON, no other text."#,
            current, instruction
        );

        let response = self.call_llm(&prompt).await?;
        let outcome: ModificationOutcome = serde_json::from_str(strip_code_fences(&response))
            .map_err(|e| DashboardError::Llm(format!("Failed to parse modification: {}", e)))?;
        Ok(outcome)
    }
}

/// Models wrap JSON in markdown fences often enough that stripping them is
/// cheaper than re-prompting.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

/// Deterministic heuristic layout used when no language model is available:
/// KPIs from numeric columns, charts from categorical/datetime columns,
/// filter controls from whatever the profile supports.
pub fn default_dashboard(dataset: &Dataset) -> DashboardConfig {
    let numeric: Vec<_> = dataset
        .metadata
        .iter()
        .filter(|m| m.semantic_type == SemanticType::Numeric)
        .collect();
    let categorical: Vec<_> = dataset
        .metadata
        .iter()
        .filter(|m| m.semantic_type == SemanticType::Categorical)
        .collect();
    let datetime: Vec<_> = dataset
        .metadata
        .iter()
        .filter(|m| m.semantic_type == SemanticType::Datetime)
        .collect();

    let mut kpis = vec![KpiSpec {
        id: "kpi_rows".to_string(),
        label: Some("Total Records".to_string()),
        metric: COUNT_AXIS.to_string(),
        aggregation: Aggregation::Count,
        format: KpiFormat::Plain,
        decimal_places: 0,
        prefix: None,
        suffix: None,
    }];
    for (idx, column) in numeric.iter().take(3).enumerate() {
        kpis.push(KpiSpec {
            id: format!("kpi_{}", idx + 1),
            label: Some(format!("Total {}", column.name)),
            metric: column.name.clone(),
            aggregation: Aggregation::Sum,
            format: KpiFormat::Plain,
            decimal_places: 1,
            prefix: None,
            suffix: None,
        });
    }

    let mut charts = Vec::new();
    let y_axis = numeric
        .first()
        .map(|m| m.name.clone())
        .unwrap_or_else(|| COUNT_AXIS.to_string());
    let aggregation = if y_axis == COUNT_AXIS {
        Aggregation::Count
    } else {
        Aggregation::Sum
    };
    for (idx, column) in categorical.iter().take(2).enumerate() {
        charts.push(ChartSpec {
            id: format!("chart_{}", idx + 1),
            kind: if idx == 0 { ChartKind::Bar } else { ChartKind::Pie },
            title: Some(format!("{} by {}", y_axis, column.name)),
            x_axis: column.name.clone(),
            y_axis: y_axis.clone(),
            aggregation,
            sort_by: None,
            sort_order: None,
            allow_cross_filter: true,
        });
    }
    if let Some(column) = datetime.first() {
        charts.push(ChartSpec {
            id: format!("chart_{}", charts.len() + 1),
            kind: ChartKind::Line,
            title: Some(format!("{} over time", y_axis)),
            x_axis: column.name.clone(),
            y_axis: y_axis.clone(),
            aggregation,
            sort_by: Some(crate::config::SortBy::Label),
            sort_order: Some(crate::config::SortOrder::Asc),
            allow_cross_filter: false,
        });
    }

    let mut filters = Vec::new();
    for column in categorical.iter().take(2) {
        let options = column
            .categorical
            .as_ref()
            .map(|c| c.top_values.iter().map(|t| t.value.clone()).collect())
            .unwrap_or_default();
        filters.push(FilterSpec {
            id: format!("filter_{}", filters.len() + 1),
            column: column.name.clone(),
            kind: FilterKind::Categorical,
            label: column.name.clone(),
            options,
            min: None,
            max: None,
            start: None,
            end: None,
        });
    }
    if let Some(column) = numeric.first() {
        let stats = column.numeric.as_ref();
        filters.push(FilterSpec {
            id: format!("filter_{}", filters.len() + 1),
            column: column.name.clone(),
            kind: FilterKind::Range,
            label: column.name.clone(),
            options: vec![],
            min: stats.map(|s| s.min),
            max: stats.map(|s| s.max),
            start: None,
            end: None,
        });
    }
    if let Some(column) = datetime.first() {
        filters.push(FilterSpec {
            id: format!("filter_{}", filters.len() + 1),
            column: column.name.clone(),
            kind: FilterKind::Date,
            label: column.name.clone(),
            options: vec![],
            min: None,
            max: None,
            start: None,
            end: None,
        });
    }

    DashboardConfig {
        title: format!("{} overview", dataset.name),
        description: format!(
            "Automatically generated dashboard over {} rows and {} columns",
            dataset.row_count(),
            dataset.columns.len()
        ),
        rationale: "Heuristic layout: numeric columns as KPIs, low-cardinality columns as charts"
            .to_string(),
        kpis,
        charts,
        filters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn heuristic_dashboard_is_valid_for_its_dataset() {
        let csv = "region,sales,day\nEast,10,2024-01-01\nWest,20,2024-01-02\nEast,5,2024-01-03\n";
        let dataset = Dataset::from_csv_text("sales", csv).unwrap();
        let config = default_dashboard(&dataset);
        assert!(config.validate(&dataset.columns).is_ok());
        assert!(!config.kpis.is_empty());
        assert!(!config.charts.is_empty());
        assert!(!config.filters.is_empty());
    }
}
