// sluice-core/src/domain/quality/mod.rs

pub mod alert;
pub mod analysis;
pub mod health;
pub mod metric;
pub mod profile;
pub mod rule;
pub mod validator;

// Re-exports
pub use alert::{Alert, AlertLevel};
pub use health::{HEALTH_WEIGHTS, health_score};
pub use metric::{MetricStatus, MetricType, QualityMetric, QualityThresholds};
pub use profile::{ColumnProfile, DataProfile};
pub use rule::{QualityRule, RuleKind, Severity};
pub use validator::{QualityValidator, RuleResult, ValidationReport};
