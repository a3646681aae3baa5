// sluice-core/src/error.rs

use crate::application::scheduler::SchedulerError;
use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SluiceError {
    // --- DOMAIN (pipeline failures, quality gates, configuration) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE (storage, IO, parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- SCHEDULER (actor lifecycle) ---
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for SluiceError {
    fn from(err: std::io::Error) -> Self {
        SluiceError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for SluiceError {
    fn from(err: duckdb::Error) -> Self {
        SluiceError::Infrastructure(err.into())
    }
}

impl From<crate::domain::error::PipelineError> for SluiceError {
    fn from(err: crate::domain::error::PipelineError) -> Self {
        SluiceError::Domain(DomainError::Pipeline(err))
    }
}
