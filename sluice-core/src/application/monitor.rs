// sluice-core/src/application/monitor.rs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::dataset::Dataset;
use crate::domain::quality::analysis;
use crate::domain::quality::{
    Alert, AlertLevel, DataProfile, MetricType, QualityMetric, QualityThresholds, QualityValidator,
    ValidationReport, health_score,
};
use crate::error::SluiceError;
use crate::ports::store::{AlertFilter, AlertRecord, HealthPoint, QualityStore};

const ALERT_QUERY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub overall_quality_score: f64,
    pub overall_health_score: f64,
    pub total_quality_checks: u64,
    pub passed_quality_checks: u64,
    pub active_alerts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTypeReport {
    pub metric_type: MetricType,
    pub total_checks: u64,
    pub passed_checks: u64,
    pub pass_rate: f64,
    pub avg_value: f64,
    pub min_value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCount {
    pub level: AlertLevel,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub pipeline: Option<String>,
    pub summary: ReportSummary,
    pub metrics: Vec<MetricTypeReport>,
    pub alerts: Vec<AlertCount>,
    pub health_trend: Vec<HealthPoint>,
    pub period_days: i64,
    pub period_start: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
}

/// Turns datasets into stored metrics, alerts, profiles and health scores.
///
/// All calls hit the store synchronously; async callers should run them on a
/// blocking thread.
#[derive(Clone)]
pub struct QualityMonitor {
    store: Arc<dyn QualityStore>,
    thresholds: QualityThresholds,
    health_window: Duration,
}

impl QualityMonitor {
    pub fn new(store: Arc<dyn QualityStore>, thresholds: QualityThresholds) -> Self {
        Self {
            store,
            thresholds,
            health_window: Duration::hours(24),
        }
    }

    pub fn with_health_window(mut self, hours: i64) -> Self {
        self.health_window = Duration::hours(hours);
        self
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    pub fn store(&self) -> &Arc<dyn QualityStore> {
        &self.store
    }

    /// Measures `data`, persists every metric and the column profile, and raises
    /// one alert per failing metric.
    #[instrument(skip(self, data, rules), fields(rows = data.row_count()))]
    pub fn analyze(
        &self,
        pipeline: &str,
        table: Option<&str>,
        data: &Dataset,
        rules: Option<&QualityValidator>,
    ) -> Result<Vec<QualityMetric>, SluiceError> {
        let now = Utc::now();
        let report = rules.map(|v| v.validate(data));
        let metrics = analysis::analyze(data, &self.thresholds, report.as_ref(), now);

        self.store.insert_metrics(pipeline, table, &metrics)?;
        self.raise_alerts(pipeline, &metrics)?;

        let profile = match report {
            Some(r) => r.profile,
            None => DataProfile::of(data),
        };
        self.store.insert_profile(pipeline, table, &profile, now)?;

        info!(
            pipeline,
            metrics = metrics.len(),
            failed = metrics.iter().filter(|m| m.failed()).count(),
            "Quality analysis stored"
        );
        Ok(metrics)
    }

    /// Stores one accuracy metric per rule of an in-flight validation and alerts
    /// on the failing ones. No profile is written.
    pub fn record_validation(
        &self,
        pipeline: &str,
        table: Option<&str>,
        report: &ValidationReport,
    ) -> Result<Vec<QualityMetric>, SluiceError> {
        let metrics = analysis::accuracy(report, self.thresholds.accuracy, Utc::now());
        if metrics.is_empty() {
            return Ok(metrics);
        }
        self.store.insert_metrics(pipeline, table, &metrics)?;
        self.raise_alerts(pipeline, &metrics)?;
        Ok(metrics)
    }

    fn raise_alerts(&self, pipeline: &str, metrics: &[QualityMetric]) -> Result<(), SluiceError> {
        for metric in metrics.iter().filter(|m| m.failed()) {
            if let Some(alert) = Alert::from_metric(metric, pipeline) {
                warn!(
                    pipeline,
                    metric = %alert.metric_name,
                    level = alert.level.as_str(),
                    "{}",
                    alert.message
                );
                self.store.upsert_alert(&alert)?;
            }
        }
        Ok(())
    }

    /// Weighted score over the trailing window. 1.0 when the window holds no data.
    pub fn health_score(
        &self,
        pipeline: &str,
        execution_id: Option<&str>,
    ) -> Result<f64, SluiceError> {
        let now = Utc::now();
        let averages = self
            .store
            .metric_type_averages(pipeline, now - self.health_window)?;
        let score = health_score(&averages);
        self.store.insert_health(pipeline, execution_id, score, now)?;
        Ok(score)
    }

    pub fn quality_report(
        &self,
        pipeline: Option<&str>,
        days: i64,
    ) -> Result<QualityReport, SluiceError> {
        let generated_at = Utc::now();
        let since = generated_at - Duration::days(days);

        let metrics: Vec<MetricTypeReport> = self
            .store
            .metric_summary(pipeline, since)?
            .into_iter()
            .map(|s| MetricTypeReport {
                metric_type: s.metric_type,
                total_checks: s.total_checks,
                passed_checks: s.passed_checks,
                pass_rate: if s.total_checks == 0 {
                    0.0
                } else {
                    s.passed_checks as f64 / s.total_checks as f64
                },
                avg_value: s.avg_value,
                min_value: s.min_value,
                max_value: s.max_value,
            })
            .collect();

        let alerts: Vec<AlertCount> = self
            .store
            .alert_counts_by_level(pipeline, since)?
            .into_iter()
            .map(|(level, count)| AlertCount { level, count })
            .collect();

        let health_trend = self.store.health_trend(pipeline, since)?;

        // Freshness is measured in hours, not as a ratio.
        let ratios: Vec<f64> = metrics
            .iter()
            .filter(|m| !m.metric_type.lower_is_better())
            .map(|m| m.avg_value)
            .collect();

        let summary = ReportSummary {
            overall_quality_score: mean_or_neutral(&ratios),
            overall_health_score: mean_or_neutral(
                &health_trend.iter().map(|h| h.avg_health).collect::<Vec<_>>(),
            ),
            total_quality_checks: metrics.iter().map(|m| m.total_checks).sum(),
            passed_quality_checks: metrics.iter().map(|m| m.passed_checks).sum(),
            active_alerts: alerts.iter().map(|a| a.count).sum(),
        };

        Ok(QualityReport {
            pipeline: pipeline.map(str::to_string),
            summary,
            metrics,
            alerts,
            health_trend,
            period_days: days,
            period_start: since,
            generated_at,
        })
    }

    /// Newest first, capped at 100.
    pub fn alerts(
        &self,
        acknowledged: bool,
        level: Option<AlertLevel>,
    ) -> Result<Vec<AlertRecord>, SluiceError> {
        let filter = AlertFilter {
            acknowledged,
            level,
            pipeline: None,
            limit: ALERT_QUERY_LIMIT,
        };
        Ok(self.store.alerts(&filter)?)
    }

    /// `false` when no alert carries this id.
    pub fn acknowledge_alert(&self, id: &str, by: &str) -> Result<bool, SluiceError> {
        let found = self.store.acknowledge_alert(id, by, Utc::now())?;
        if found {
            info!(alert = id, by, "Alert acknowledged");
        }
        Ok(found)
    }
}

fn mean_or_neutral(values: &[f64]) -> f64 {
    if values.is_empty() {
        1.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
