// sluice-core/src/ports/store.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::pipeline::Execution;
use crate::domain::quality::{Alert, AlertLevel, DataProfile, MetricType, QualityMetric};
use crate::infrastructure::error::InfrastructureError;

/// An alert as persisted, with its acknowledgement trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    #[serde(flatten)]
    pub alert: Alert,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub acknowledged: bool,
    pub level: Option<AlertLevel>,
    pub pipeline: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTypeSummary {
    pub metric_type: MetricType,
    pub total_checks: u64,
    pub passed_checks: u64,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthPoint {
    pub date: NaiveDate,
    pub avg_health: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub pipeline_name: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub avg_duration: f64,
    pub total_records_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerMetric {
    pub pipeline_name: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Durable record of executions, metrics, alerts, profiles and health.
///
/// Implementations must be safe under concurrent writers. Calls are synchronous;
/// async callers move them onto a blocking thread.
pub trait QualityStore: Send + Sync {
    // --- quality metrics ---
    fn insert_metrics(
        &self,
        pipeline: &str,
        table: Option<&str>,
        metrics: &[QualityMetric],
    ) -> Result<(), InfrastructureError>;

    /// Mean metric value per type for one pipeline since `since`.
    fn metric_type_averages(
        &self,
        pipeline: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<(MetricType, f64)>, InfrastructureError>;

    fn metric_summary(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricTypeSummary>, InfrastructureError>;

    // --- alerts ---
    /// Insert or replace by alert id.
    fn upsert_alert(&self, alert: &Alert) -> Result<(), InfrastructureError>;

    /// Newest first, at most `filter.limit` rows.
    fn alerts(&self, filter: &AlertFilter) -> Result<Vec<AlertRecord>, InfrastructureError>;

    /// Returns false when no alert has this id.
    fn acknowledge_alert(
        &self,
        id: &str,
        by: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, InfrastructureError>;

    /// Unacknowledged alerts per level raised since `since`.
    fn alert_counts_by_level(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<(AlertLevel, u64)>, InfrastructureError>;

    // --- profiles & health ---
    fn insert_profile(
        &self,
        pipeline: &str,
        table: Option<&str>,
        profile: &DataProfile,
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError>;

    fn insert_health(
        &self,
        pipeline: &str,
        execution_id: Option<&str>,
        score: f64,
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError>;

    /// Daily average health, oldest day first.
    fn health_trend(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<HealthPoint>, InfrastructureError>;

    // --- executions & scheduler bookkeeping ---
    fn insert_execution(&self, execution: &Execution) -> Result<(), InfrastructureError>;

    fn execution_count(&self, pipeline: &str) -> Result<u64, InfrastructureError>;

    fn execution_summaries(
        &self,
        pipeline: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Vec<ExecutionSummary>, InfrastructureError>;

    fn insert_scheduler_metrics(
        &self,
        pipeline: &str,
        metrics: &[(&str, f64)],
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError>;

    /// Latest value of every scheduler metric per pipeline.
    fn latest_scheduler_metrics(
        &self,
        pipeline: Option<&str>,
    ) -> Result<Vec<SchedulerMetric>, InfrastructureError>;

    fn log_event(
        &self,
        event_type: &str,
        pipeline: Option<&str>,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), InfrastructureError>;
}
