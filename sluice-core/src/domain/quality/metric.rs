// sluice-core/src/domain/quality/metric.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Completeness,
    Accuracy,
    Consistency,
    Timeliness,
    Validity,
    Uniqueness,
}

impl MetricType {
    pub const ALL: [MetricType; 6] = [
        MetricType::Completeness,
        MetricType::Accuracy,
        MetricType::Consistency,
        MetricType::Timeliness,
        MetricType::Validity,
        MetricType::Uniqueness,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Completeness => "completeness",
            MetricType::Accuracy => "accuracy",
            MetricType::Consistency => "consistency",
            MetricType::Timeliness => "timeliness",
            MetricType::Validity => "validity",
            MetricType::Uniqueness => "uniqueness",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Timeliness is an age in hours: lower is better.
    pub fn lower_is_better(self) -> bool {
        self == MetricType::Timeliness
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Pass,
    Fail,
}

impl MetricStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricStatus::Pass => "pass",
            MetricStatus::Fail => "fail",
        }
    }
}

/// One measurement taken during an analysis. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    pub name: String,
    pub value: f64,
    pub threshold: f64,
    pub metric_type: MetricType,
    pub status: MetricStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl QualityMetric {
    /// Builds a metric and derives its status from value and threshold.
    pub fn measure(
        name: impl Into<String>,
        metric_type: MetricType,
        value: f64,
        threshold: f64,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let passed = if metric_type.lower_is_better() {
            value <= threshold
        } else {
            value >= threshold
        };

        Self {
            name: name.into(),
            value,
            threshold,
            metric_type,
            status: if passed {
                MetricStatus::Pass
            } else {
                MetricStatus::Fail
            },
            message: message.into(),
            timestamp,
        }
    }

    pub fn failed(&self) -> bool {
        self.status == MetricStatus::Fail
    }
}

/// Pass thresholds per metric type. Ratios are in [0, 1]; timeliness is in hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "kebab-case", default)]
pub struct QualityThresholds {
    #[validate(range(min = 0.0, max = 1.0))]
    pub completeness: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub accuracy: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub consistency: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub validity: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub uniqueness: f64,
    #[validate(range(min = 0.0))]
    pub timeliness_hours: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            completeness: 0.95,
            accuracy: 0.98,
            consistency: 0.95,
            validity: 0.99,
            uniqueness: 0.98,
            timeliness_hours: 24.0,
        }
    }
}

impl QualityThresholds {
    pub fn for_type(&self, metric_type: MetricType) -> f64 {
        match metric_type {
            MetricType::Completeness => self.completeness,
            MetricType::Accuracy => self.accuracy,
            MetricType::Consistency => self.consistency,
            MetricType::Validity => self.validity,
            MetricType::Uniqueness => self.uniqueness,
            MetricType::Timeliness => self.timeliness_hours,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_threshold() {
        let now = Utc::now();
        let m = QualityMetric::measure("c", MetricType::Completeness, 0.95, 0.95, "", now);
        assert_eq!(m.status, MetricStatus::Pass);
        let m = QualityMetric::measure("c", MetricType::Completeness, 0.9, 0.95, "", now);
        assert!(m.failed());
        // Older data is worse for timeliness.
        let m = QualityMetric::measure("f", MetricType::Timeliness, 30.0, 24.0, "", now);
        assert!(m.failed());
        let m = QualityMetric::measure("f", MetricType::Timeliness, 2.0, 24.0, "", now);
        assert!(!m.failed());
    }

    #[test]
    fn test_thresholds_partial_override_and_validation() {
        let t: QualityThresholds = serde_yaml::from_str("completeness: 0.9\n").unwrap();
        assert_eq!(t.completeness, 0.9);
        assert_eq!(t.uniqueness, 0.98);
        assert!(t.validate().is_ok());

        let bad = QualityThresholds {
            validity: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_metric_type_parse() {
        assert_eq!(MetricType::parse("validity"), Some(MetricType::Validity));
        assert_eq!(MetricType::parse("speed"), None);
    }
}
