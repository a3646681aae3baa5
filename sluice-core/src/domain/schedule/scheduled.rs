// sluice-core/src/domain/schedule/scheduled.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::PipelineConfig;
use crate::domain::schedule::spec::ScheduleSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// A registry entry. The name is the registry key and is not serialized with the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPipeline {
    #[serde(skip)]
    pub name: String,
    pub pipeline: PipelineConfig,
    pub schedule: ScheduleSpec,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status: RunStatus,
    /// Outcome of the most recent finished run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledPipeline {
    pub fn new(name: impl Into<String>, pipeline: PipelineConfig, schedule: ScheduleSpec) -> Self {
        Self {
            name: name.into(),
            pipeline,
            schedule,
            enabled: true,
            status: RunStatus::Scheduled,
            last_status: None,
            last_run: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// `scheduled -> running`, counted at dispatch.
    pub fn mark_running(&mut self, at: DateTime<Utc>) {
        self.status = RunStatus::Running;
        self.last_run = Some(at);
        self.run_count += 1;
    }

    /// `running -> completed | failed -> scheduled`. The outcome stays in `last_status`.
    pub fn mark_finished(&mut self, success: bool) {
        let outcome = if success {
            self.success_count += 1;
            RunStatus::Completed
        } else {
            self.failure_count += 1;
            RunStatus::Failed
        };
        self.last_status = Some(outcome);
        self.status = RunStatus::Scheduled;
    }

    pub fn success_rate(&self) -> f64 {
        self.success_count as f64 / self.run_count.max(1) as f64
    }
}
