// sluice-core/src/application/components/inline.rs

use async_trait::async_trait;

use crate::domain::dataset::Dataset;
use crate::domain::error::BoxError;
use crate::ports::component::{Extractor, StageContext};

/// Serves a fixed dataset, typically embedded in the pipeline definition.
pub struct InlineExtractor {
    data: Dataset,
}

impl InlineExtractor {
    pub fn new(data: Dataset) -> Self {
        Self { data }
    }
}

#[async_trait]
impl Extractor for InlineExtractor {
    async fn extract(&self, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
        Ok(self.data.clone())
    }
}
