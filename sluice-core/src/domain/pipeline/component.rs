// sluice-core/src/domain/pipeline/component.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ComponentRole {
    Extractor,
    Transformer,
    Loader,
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentRole::Extractor => "extractor",
            ComponentRole::Transformer => "transformer",
            ComponentRole::Loader => "loader",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// Per-invocation record kept by the component wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetrics {
    pub component_name: String,
    pub role: ComponentRole,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub status: ComponentStatus,
    pub records_processed: usize,
    pub attempts: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ComponentMetrics {
    pub fn new(component_name: impl Into<String>, role: ComponentRole) -> Self {
        Self {
            component_name: component_name.into(),
            role,
            start_time: None,
            end_time: None,
            duration_seconds: 0.0,
            status: ComponentStatus::Pending,
            records_processed: 0,
            attempts: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn begin(&mut self) {
        self.start_time = Some(Utc::now());
        self.status = ComponentStatus::Running;
    }

    pub fn complete(&mut self, records: usize) {
        self.records_processed = records;
        self.status = ComponentStatus::Completed;
        self.finish_clock();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = ComponentStatus::Failed;
        self.finish_clock();
    }

    fn finish_clock(&mut self) {
        let end = Utc::now();
        if let Some(start) = self.start_time {
            self.duration_seconds = (end - start).num_microseconds().unwrap_or(0) as f64 / 1e6;
        }
        self.end_time = Some(end);
    }
}
