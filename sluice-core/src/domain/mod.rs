pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod schedule;

pub use error::{BoxError, DataQualityError, DomainError, PipelineError};
