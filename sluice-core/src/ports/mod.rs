pub mod component;
pub mod store;

pub use component::{Extractor, Loader, StageContext, Transformer};
pub use store::{
    AlertFilter, AlertRecord, ExecutionSummary, HealthPoint, MetricTypeSummary, QualityStore,
    SchedulerMetric,
};
