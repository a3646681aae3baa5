// sluice-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

/// Type-erased cause carried by component failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised by a strict quality gate when at least one error-severity rule fails.
#[derive(Error, Debug, Diagnostic)]
#[error("Data quality validation failed: {failed_rules} critical errors")]
#[diagnostic(
    code(sluice::domain::data_quality),
    help("Fix the offending rows upstream or lower the rule severity to 'warning'.")
)]
pub struct DataQualityError {
    pub component: String,
    pub failed_rules: usize,
    pub messages: Vec<String>,
}

#[derive(Error, Debug, Diagnostic)]
pub enum PipelineError {
    #[error("Extraction failed in '{component}': {source}")]
    #[diagnostic(code(sluice::pipeline::extraction))]
    Extraction {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error("Transformation failed in '{component}': {source}")]
    #[diagnostic(code(sluice::pipeline::transformation))]
    Transformation {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error("Loading failed in '{component}': {source}")]
    #[diagnostic(code(sluice::pipeline::load))]
    Load {
        component: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    DataQuality(#[from] DataQualityError),

    #[error("Component '{component}' exceeded the {seconds}s execution deadline")]
    #[diagnostic(
        code(sluice::pipeline::timeout),
        help("Raise 'timeout_seconds' in the pipeline config or make the component faster.")
    )]
    Timeout { component: String, seconds: u64 },
}

impl PipelineError {
    /// Name of the component the failure is attributed to.
    pub fn component(&self) -> &str {
        match self {
            PipelineError::Extraction { component, .. }
            | PipelineError::Transformation { component, .. }
            | PipelineError::Load { component, .. }
            | PipelineError::Timeout { component, .. } => component,
            PipelineError::DataQuality(e) => &e.component,
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Configuration Error: {0}")]
    #[diagnostic(
        code(sluice::domain::configuration),
        help("Check the 'class' and rule 'type' tags in your pipeline definition.")
    )]
    Configuration(String),

    #[error("Invalid schedule for '{pipeline}': {reason}")]
    #[diagnostic(code(sluice::domain::schedule))]
    Schedule { pipeline: String, reason: String },
}
