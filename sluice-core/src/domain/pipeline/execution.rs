// sluice-core/src/domain/pipeline/execution.rs

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::component::{ComponentMetrics, ComponentRole, ComponentStatus};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

/// One run of a pipeline. Immutable once `finalize` has been called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub pipeline_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub duration_seconds: f64,
    pub total_components: usize,
    pub successful_components: usize,
    pub failed_components: usize,
    pub component_metrics: Vec<ComponentMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_score: Option<f64>,
}

impl Execution {
    pub fn start(pipeline_name: impl Into<String>, total_components: usize) -> Self {
        let pipeline_name = pipeline_name.into();
        let start_time = Utc::now();
        Self {
            execution_id: Self::make_id(&pipeline_name, &start_time),
            pipeline_name,
            start_time,
            end_time: None,
            status: ExecutionStatus::Running,
            duration_seconds: 0.0,
            total_components,
            successful_components: 0,
            failed_components: 0,
            component_metrics: Vec::with_capacity(total_components),
            error: None,
            health_score: None,
        }
    }

    /// Content hash of the pipeline name and a nanosecond start timestamp.
    pub fn make_id(pipeline_name: &str, start: &DateTime<Utc>) -> String {
        let key = format!(
            "{}_{}",
            pipeline_name,
            start.to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        format!("{:x}", md5::compute(key.as_bytes()))
    }

    pub fn record(&mut self, metrics: ComponentMetrics) {
        match metrics.status {
            ComponentStatus::Completed => self.successful_components += 1,
            ComponentStatus::Failed => self.failed_components += 1,
            ComponentStatus::Pending | ComponentStatus::Running => {}
        }
        self.component_metrics.push(metrics);
    }

    /// Failed if any component failed or an error was recorded, completed otherwise.
    pub fn finalize(&mut self) {
        let end = Utc::now();
        self.duration_seconds = (end - self.start_time).num_microseconds().unwrap_or(0) as f64 / 1e6;
        self.end_time = Some(end);
        self.status = if self.failed_components > 0 || self.error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Rows produced by the extractor, the volume the run moved.
    pub fn records_processed(&self) -> usize {
        self.component_metrics
            .iter()
            .find(|m| m.role == ComponentRole::Extractor)
            .map(|m| m.records_processed)
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn metric(name: &str, role: ComponentRole, ok: bool) -> ComponentMetrics {
        let mut m = ComponentMetrics::new(name, role);
        m.begin();
        if ok { m.complete(5) } else { m.fail("boom") }
        m
    }

    #[test]
    fn test_counts_and_status() {
        let mut exec = Execution::start("daily", 3);
        exec.record(metric("src", ComponentRole::Extractor, true));
        exec.record(metric("clean", ComponentRole::Transformer, false));
        exec.record(metric("sink", ComponentRole::Loader, true));
        exec.finalize();

        assert_eq!(exec.successful_components, 2);
        assert_eq!(exec.failed_components, 1);
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.records_processed(), 5);
        assert!(exec.end_time.is_some());
    }

    #[test]
    fn test_id_is_md5_of_name_and_start() {
        let exec = Execution::start("daily", 0);
        assert_eq!(exec.execution_id.len(), 32);
        assert_eq!(
            exec.execution_id,
            Execution::make_id("daily", &exec.start_time)
        );
    }

    #[test]
    fn test_round_trips_as_json() {
        let mut exec = Execution::start("daily", 1);
        exec.record(metric("src", ComponentRole::Extractor, true));
        exec.finalize();
        let json = serde_json::to_string(&exec).unwrap();
        assert!(json.contains("\"status\":\"completed\""));
        let back: Execution = serde_json::from_str(&json).unwrap();
        assert_eq!(back, exec);
    }
}
