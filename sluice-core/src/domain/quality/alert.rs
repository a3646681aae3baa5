// sluice-core/src/domain/quality/alert.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::quality::metric::QualityMetric;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Some(AlertLevel::Info),
            "warning" => Some(AlertLevel::Warning),
            "error" => Some(AlertLevel::Error),
            "critical" => Some(AlertLevel::Critical),
            _ => None,
        }
    }

    /// Tier by how far the metric fell short: `< 0.5` critical, `< 0.8` error, else warning.
    /// `ratio` is actual/threshold, or threshold/actual when lower values are better.
    pub fn for_ratio(ratio: f64) -> Self {
        if ratio < 0.5 {
            AlertLevel::Critical
        } else if ratio < 0.8 {
            AlertLevel::Error
        } else {
            AlertLevel::Warning
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub pipeline_name: String,
    pub metric_name: String,
    pub threshold: f64,
    pub actual_value: f64,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    /// Id is a content hash of (pipeline, metric, timestamp), so re-emitting
    /// the same breach yields the same id.
    pub fn make_id(pipeline: &str, metric: &str, timestamp: &DateTime<Utc>) -> String {
        let key = format!("{}_{}_{}", pipeline, metric, timestamp.to_rfc3339());
        format!("{:x}", md5::compute(key.as_bytes()))
    }

    /// Alert for a failing metric; `None` when the metric passed.
    pub fn from_metric(metric: &QualityMetric, pipeline: &str) -> Option<Self> {
        if !metric.failed() {
            return None;
        }

        let ratio = shortfall_ratio(metric);
        let level = AlertLevel::for_ratio(ratio);

        Some(Self {
            id: Self::make_id(pipeline, &metric.name, &metric.timestamp),
            level,
            title: format!("Quality Alert: {}", metric.name),
            message: format!(
                "{} (value: {:.3}, threshold: {:.3})",
                metric.message, metric.value, metric.threshold
            ),
            pipeline_name: pipeline.to_string(),
            metric_name: metric.name.clone(),
            threshold: metric.threshold,
            actual_value: metric.value,
            timestamp: metric.timestamp,
            acknowledged: false,
        })
    }
}

fn shortfall_ratio(metric: &QualityMetric) -> f64 {
    let (num, den) = if metric.metric_type.lower_is_better() {
        (metric.threshold, metric.value)
    } else {
        (metric.value, metric.threshold)
    };
    // No meaningful scale to compare against.
    if den <= 0.0 { 1.0 } else { num / den }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::quality::metric::MetricType;

    fn completeness(value: f64) -> QualityMetric {
        QualityMetric::measure(
            "completeness_email",
            MetricType::Completeness,
            value,
            0.95,
            "Column email completeness",
            Utc::now(),
        )
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(AlertLevel::for_ratio(0.49), AlertLevel::Critical);
        assert_eq!(AlertLevel::for_ratio(0.5), AlertLevel::Error);
        assert_eq!(AlertLevel::for_ratio(0.79), AlertLevel::Error);
        assert_eq!(AlertLevel::for_ratio(0.8), AlertLevel::Warning);
    }

    #[test]
    fn test_passing_metric_has_no_alert() {
        assert!(Alert::from_metric(&completeness(0.97), "p").is_none());
    }

    #[test]
    fn test_alert_level_from_metric() {
        let warn = Alert::from_metric(&completeness(0.90), "p").unwrap();
        assert_eq!(warn.level, AlertLevel::Warning);
        let crit = Alert::from_metric(&completeness(0.40), "p").unwrap();
        assert_eq!(crit.level, AlertLevel::Critical);
        assert!(!crit.acknowledged);
    }

    #[test]
    fn test_timeliness_tier_is_inverted() {
        let stale = QualityMetric::measure(
            "freshness_updated_at",
            MetricType::Timeliness,
            96.0,
            24.0,
            "stale",
            Utc::now(),
        );
        let alert = Alert::from_metric(&stale, "p").unwrap();
        assert_eq!(alert.level, AlertLevel::Critical);
    }

    #[test]
    fn test_id_is_deterministic() {
        let ts = Utc::now();
        assert_eq!(
            Alert::make_id("p", "m", &ts),
            Alert::make_id("p", "m", &ts)
        );
        assert_ne!(
            Alert::make_id("p", "m", &ts),
            Alert::make_id("p", "other", &ts)
        );
        assert_eq!(Alert::make_id("p", "m", &ts).len(), 32);
    }
}
