// sluice-core/src/application/components/quality_gate.rs

use async_trait::async_trait;
use tracing::{error, warn};

use crate::application::monitor::QualityMonitor;
use crate::domain::dataset::Dataset;
use crate::domain::error::{BoxError, DataQualityError, DomainError};
use crate::domain::quality::{QualityRule, QualityValidator, ValidationReport};
use crate::ports::component::{StageContext, Transformer};

/// Validates the dataset in flight and passes it through unchanged.
///
/// Failed rules become stage warnings. In strict mode an error-severity failure
/// raises [`DataQualityError`] instead. With a monitor attached, every rule is
/// also stored as an accuracy metric keyed by the gate name, and failing rules
/// raise alerts, strict or not.
pub struct QualityGate {
    name: String,
    validator: QualityValidator,
    strict: bool,
    monitor: Option<QualityMonitor>,
}

impl QualityGate {
    pub fn new(
        name: impl Into<String>,
        rules: Vec<QualityRule>,
        strict: bool,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            name: name.into(),
            validator: QualityValidator::new(rules)?,
            strict,
            monitor: None,
        })
    }

    pub fn with_monitor(mut self, monitor: QualityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Store errors are logged; they never decide the gate's verdict.
    async fn record(&self, monitor: &QualityMonitor, pipeline: &str, report: &ValidationReport) {
        let monitor = monitor.clone();
        let pipeline = pipeline.to_string();
        let table = self.name.clone();
        let report = report.clone();
        let joined = tokio::task::spawn_blocking(move || {
            monitor.record_validation(&pipeline, Some(&table), &report)
        })
        .await;
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(component = %self.name, error = %e, "Failed to store gate metrics"),
            Err(e) => error!(component = %self.name, error = %e, "Gate metrics task aborted"),
        }
    }
}

#[async_trait]
impl Transformer for QualityGate {
    async fn transform(&self, data: &Dataset, ctx: &mut StageContext) -> Result<Dataset, BoxError> {
        let report = self.validator.validate(data);

        if let Some(monitor) = &self.monitor {
            self.record(monitor, &ctx.pipeline_name, &report).await;
        }

        for failed in report.failed_warnings() {
            ctx.warn(format!("{}: {}", failed.rule_name, failed.message));
        }

        let errors: Vec<String> = report
            .failed_errors()
            .map(|r| format!("{}: {}", r.rule_name, r.message))
            .collect();

        if !errors.is_empty() {
            if self.strict {
                return Err(Box::new(DataQualityError {
                    component: self.name.clone(),
                    failed_rules: errors.len(),
                    messages: errors,
                }));
            }
            warn!(
                component = %self.name,
                failed = errors.len(),
                "Error-severity rules failed, continuing (strict mode off)"
            );
            for message in errors {
                ctx.warn(message);
            }
        }

        Ok(data.clone())
    }
}
