//! Session Orchestrator - owns one dashboard's state (config history,
//! filters, cross-filter) over an immutable dataset and exposes the read
//! model consumed by renderers. Sessions are explicit objects keyed by id;
//! there is no ambient singleton and no default user.

use crate::aggregate::{aggregate_for_chart, compute_kpi, Bucket, KpiValue};
use crate::config::DashboardConfig;
use crate::dataset::{Dataset, Row};
use crate::error::{DashboardError, Result};
use crate::export;
use crate::filter::{compute_visible_rows, is_no_restriction, CrossFilter, FilterState, FilterValue};
use crate::history::ModificationHistory;
use crate::llm::DashboardModifier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Explicit caller identity threaded into every session instead of a
/// hidden default-user constant.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into() }
    }
}

/// Clears the busy flag when the in-flight modification finishes, fails or
/// is abandoned (future dropped).
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct DashboardSession {
    pub id: String,
    user: UserContext,
    dataset: Arc<Dataset>,
    history: ModificationHistory,
    filter_state: FilterState,
    cross_filter: Option<CrossFilter>,
    /// Recomputed eagerly on every filter/cross-filter/config change.
    filtered_rows: Vec<Row>,
    /// Bumped whenever `filtered_rows` changes; part of the memo key.
    filter_revision: u64,
    /// Bumped on every config transition (modification, undo, redo).
    config_revision: u64,
    chart_cache: HashMap<(u64, u64, String), Vec<Bucket>>,
    kpi_cache: HashMap<(u64, u64, String), KpiValue>,
    busy: Arc<AtomicBool>,
}

impl DashboardSession {
    /// Create a session over a dataset and an initial (already generated)
    /// configuration. The config is validated against the dataset columns.
    pub fn new(
        dataset: Arc<Dataset>,
        initial_config: DashboardConfig,
        user: UserContext,
    ) -> Result<Self> {
        initial_config
            .validate(&dataset.columns)
            .map_err(DashboardError::Session)?;

        let mut session = Self {
            id: Uuid::new_v4().to_string(),
            user,
            dataset,
            history: ModificationHistory::new(initial_config),
            filter_state: FilterState::new(),
            cross_filter: None,
            filtered_rows: Vec::new(),
            filter_revision: 0,
            config_revision: 0,
            chart_cache: HashMap::new(),
            kpi_cache: HashMap::new(),
            busy: Arc::new(AtomicBool::new(false)),
        };
        session.recompute_filtered_rows();
        Ok(session)
    }

    pub fn user(&self) -> &UserContext {
        &self.user
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &DashboardConfig {
        self.history.current()
    }

    pub fn filtered_rows(&self) -> &[Row] {
        &self.filtered_rows
    }

    pub fn filter_state(&self) -> &FilterState {
        &self.filter_state
    }

    pub fn cross_filter(&self) -> Option<&CrossFilter> {
        self.cross_filter.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn last_changes(&self) -> &[String] {
        self.history.last_changes()
    }

    /// Set one filter control's value. A value that cannot restrict the
    /// column (empty selection, range or date range covering the control's
    /// declared bounds) removes the entry so it cannot exclude rows.
    /// Unknown filter ids are logged and ignored.
    pub fn update_filter(&mut self, filter_id: &str, value: FilterValue) {
        let unrestricted = match self.config().filter(filter_id) {
            None => {
                tracing::warn!(filter_id, "Ignoring update for unknown filter");
                return;
            }
            Some(spec) => is_no_restriction(spec, &value),
        };
        if unrestricted {
            self.filter_state.remove(filter_id);
        } else {
            self.filter_state.insert(filter_id.to_string(), value);
        }
        self.recompute_filtered_rows();
    }

    /// Reset every filter control and any active cross-filter. Not tracked
    /// in the modification history.
    pub fn clear_filters(&mut self) {
        self.filter_state.clear();
        self.cross_filter = None;
        self.recompute_filtered_rows();
    }

    /// Drill down on a chart element. Replaces any active cross-filter;
    /// clicking the already-active bucket re-applies the identical event
    /// (idempotent, no toggle-off). Charts that forbid cross-filtering and
    /// unknown chart ids are logged and ignored.
    pub fn apply_cross_filter(&mut self, chart_id: &str, column: &str, value: &str) {
        match self.config().chart(chart_id) {
            None => {
                tracing::warn!(chart_id, "Ignoring cross-filter from unknown chart");
                return;
            }
            Some(chart) if !chart.allow_cross_filter => {
                tracing::warn!(chart_id, "Chart does not permit cross-filtering");
                return;
            }
            Some(_) => {}
        }

        self.cross_filter = Some(CrossFilter {
            source_chart_id: chart_id.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        });
        self.recompute_filtered_rows();
    }

    pub fn clear_cross_filter(&mut self) {
        if self.cross_filter.take().is_some() {
            self.recompute_filtered_rows();
        }
    }

    /// Buckets for one chart, memoized by (filter revision, config
    /// revision, chart id).
    pub fn chart_data(&mut self, chart_id: &str) -> Result<Vec<Bucket>> {
        let key = (self.filter_revision, self.config_revision, chart_id.to_string());
        if let Some(cached) = self.chart_cache.get(&key) {
            return Ok(cached.clone());
        }

        let chart = self
            .config()
            .chart(chart_id)
            .ok_or_else(|| DashboardError::Session(format!("Unknown chart: {}", chart_id)))?
            .clone();
        let buckets = aggregate_for_chart(&self.filtered_rows, &chart);
        self.chart_cache.insert(key, buckets.clone());
        Ok(buckets)
    }

    /// Buckets for every chart in config order.
    pub fn all_chart_data(&mut self) -> Vec<(String, Vec<Bucket>)> {
        let chart_ids: Vec<String> = self.config().charts.iter().map(|c| c.id.clone()).collect();
        chart_ids
            .into_iter()
            .filter_map(|id| self.chart_data(&id).ok().map(|buckets| (id, buckets)))
            .collect()
    }

    /// Formatted KPI values in config order, memoized like charts.
    pub fn kpi_values(&mut self) -> Vec<KpiValue> {
        let kpis = self.config().kpis.clone();
        kpis.iter()
            .map(|kpi| {
                let key = (self.filter_revision, self.config_revision, kpi.id.clone());
                if let Some(cached) = self.kpi_cache.get(&key) {
                    return cached.clone();
                }
                let value = compute_kpi(&self.filtered_rows, kpi);
                self.kpi_cache.insert(key, value.clone());
                value
            })
            .collect()
    }

    /// CSV export of the current filtered rows.
    pub fn export_csv(&self) -> String {
        export::export_csv(&self.dataset.columns, &self.filtered_rows)
    }

    /// Send the current config plus a natural-language instruction to the
    /// modification collaborator and push the result as a new snapshot.
    ///
    /// Concurrency contract: at most one modification may be outstanding.
    /// Further calls are rejected with `DashboardError::Busy` while one is
    /// in flight. On failure (transport, malformed config) the history is
    /// left untouched. The busy flag is cleared on every exit path,
    /// including abandonment of the returned future.
    pub async fn apply_modification(
        &mut self,
        modifier: &dyn DashboardModifier,
        instruction: &str,
    ) -> Result<Vec<String>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DashboardError::Busy);
        }
        let _guard = BusyGuard { flag: Arc::clone(&self.busy) };

        tracing::info!(
            session = %self.id,
            user = %self.user.user_id,
            instruction,
            "Applying dashboard modification"
        );

        let outcome = modifier.modify(self.history.current(), instruction).await?;

        outcome
            .config
            .validate(&self.dataset.columns)
            .map_err(|reason| {
                DashboardError::Modification(format!("Collaborator returned invalid config: {}", reason))
            })?;

        self.history.push(outcome.config, outcome.changes.clone());
        self.on_config_changed();
        Ok(outcome.changes)
    }

    /// Step back one snapshot; false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let moved = self.history.undo();
        if moved {
            self.on_config_changed();
        }
        moved
    }

    /// Step forward one snapshot; false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let moved = self.history.redo();
        if moved {
            self.on_config_changed();
        }
        moved
    }

    fn on_config_changed(&mut self) {
        self.config_revision += 1;
        // Filter specs may have changed with the config, so the visible
        // rows can change too.
        self.recompute_filtered_rows();
    }

    fn recompute_filtered_rows(&mut self) {
        let config = self.history.current();
        self.filtered_rows = compute_visible_rows(
            &self.dataset.rows,
            &config.filters,
            &self.filter_state,
            self.cross_filter.as_ref(),
        );
        self.filter_revision += 1;
        self.chart_cache.clear();
        self.kpi_cache.clear();
        tracing::debug!(
            session = %self.id,
            visible = self.filtered_rows.len(),
            total = self.dataset.rows.len(),
            "Recomputed filtered rows"
        );
    }
}

/// Registry of live sessions, keyed by session id. Lets several dashboards
/// (and tests) coexist without global mutable state.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<String, DashboardSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a session; returns its id.
    pub fn create_session(
        &mut self,
        dataset: Arc<Dataset>,
        initial_config: DashboardConfig,
        user: UserContext,
    ) -> Result<String> {
        let session = DashboardSession::new(dataset, initial_config, user)?;
        let id = session.id.clone();
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    pub fn session(&self, session_id: &str) -> Result<&DashboardSession> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| DashboardError::Session(format!("Unknown session: {}", session_id)))
    }

    pub fn session_mut(&mut self, session_id: &str) -> Result<&mut DashboardSession> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| DashboardError::Session(format!("Unknown session: {}", session_id)))
    }

    /// Drop a session (e.g. when the user loads a new dataset).
    pub fn remove_session(&mut self, session_id: &str) -> Option<DashboardSession> {
        self.sessions.remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
