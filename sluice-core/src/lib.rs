// sluice-core/src/lib.rs

#![allow(missing_docs)]
// 1. Memory safety
#![deny(unsafe_code)]
// 2. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 3. Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// Contracts at the seams: component capabilities and the quality store.
pub mod ports;

// Data model and pure algorithms (dataset, rules, metrics, schedules).
// Depends on nothing else in the crate.
pub mod domain;

// Adapters: DuckDB store and connectors, config files, atomic writes.
pub mod infrastructure;

// Use cases: orchestrator, quality monitor, scheduler.
pub mod application;

pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use application::{
    ExecutionOutcome, Pipeline, PipelineScheduler, QualityMonitor, RunFailure, SchedulerHandle,
};
pub use domain::dataset::{DataType, Dataset, Value};
pub use error::SluiceError;
