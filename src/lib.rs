//! Insight Engine - the in-memory analytics core behind the dashboard
//! feature: deterministic aggregation of tabular rows into chart buckets
//! and KPIs, composable filtering with cross-filter drill-down, and an
//! undo/redo history over language-model-driven dashboard modifications.
//!
//! Data flow: [`dataset::Dataset`] -> [`filter`] -> [`aggregate`] ->
//! rendering consumers. Configuration flows independently through
//! [`history::ModificationHistory`], driven by the [`llm`] collaborator and
//! orchestrated per session by [`session::DashboardSession`].

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod history;
pub mod llm;
pub mod profile;
pub mod session;
pub mod value;
