pub mod component;
pub mod config;
pub mod execution;

pub use component::{ComponentMetrics, ComponentRole, ComponentStatus};
pub use config::{
    CaseType, CleaningRule, ComponentConfig, DatePart, EnrichmentRule, ExtractorKind, FillStrategy,
    LoadMode, LoaderKind, PipelineConfig, PipelinePolicy, QualityConfig, TextFeature,
    TransformerKind,
};
pub use execution::{Execution, ExecutionStatus};
