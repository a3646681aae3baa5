// sluice-core/src/ports/component.rs

// Capabilities the orchestrator drives. It never knows which concrete source or
// sink stands behind them: DuckDB, a file, an HTTP API living in the host.

use async_trait::async_trait;

use crate::domain::dataset::Dataset;
use crate::domain::error::BoxError;

/// Per-run context handed to every stage invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub pipeline_name: String,
    pub execution_id: String,
    warnings: Vec<String>,
}

impl StageContext {
    pub fn new(pipeline_name: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            execution_id: execution_id.into(),
            warnings: Vec::new(),
        }
    }

    /// Non-fatal finding, copied into the component's metrics.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, ctx: &mut StageContext) -> Result<Dataset, BoxError>;
}

#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, data: &Dataset, ctx: &mut StageContext) -> Result<Dataset, BoxError>;
}

#[async_trait]
pub trait Loader: Send + Sync {
    /// `Ok(false)` means the sink refused the batch; the orchestrator treats it as a load failure.
    async fn load(&self, data: &Dataset, ctx: &mut StageContext) -> Result<bool, BoxError>;
}
