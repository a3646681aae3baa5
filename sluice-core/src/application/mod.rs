// sluice-core/src/application/mod.rs

pub mod components;
pub mod monitor;
pub mod orchestrator;
pub mod scheduler;
mod writer;

// --- RE-EXPORTS ---
pub use monitor::{QualityMonitor, QualityReport};
pub use orchestrator::{Pipeline, PipelineBuilder, PipelineDeps, RunFailure};
pub use scheduler::{
    ExecutionOutcome, PipelineScheduler, PipelineStatus, SchedulerError, SchedulerHandle,
    SchedulerMetrics, SchedulerSettings,
};
