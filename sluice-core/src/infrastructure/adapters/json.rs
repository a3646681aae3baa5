// sluice-core/src/infrastructure/adapters/json.rs

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use tracing::info;

use crate::domain::dataset::Dataset;
use crate::domain::error::BoxError;
use crate::infrastructure::fs::atomic_write;
use crate::ports::component::{Loader, StageContext};

/// Writes the dataset as a pretty JSON array of row objects, replacing the file.
pub struct JsonLoader {
    path: PathBuf,
}

impl JsonLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

pub fn to_records(data: &Dataset) -> Result<JsonValue, serde_json::Error> {
    let records = data
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::with_capacity(data.column_count());
            for (column, value) in data.columns.iter().zip(row.iter()) {
                object.insert(column.name.clone(), serde_json::to_value(value)?);
            }
            Ok(JsonValue::Object(object))
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    Ok(JsonValue::Array(records))
}

#[async_trait]
impl Loader for JsonLoader {
    async fn load(&self, data: &Dataset, ctx: &mut StageContext) -> Result<bool, BoxError> {
        let content = serde_json::to_string_pretty(&to_records(data)?)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(path, content)).await??;

        info!(
            pipeline = %ctx.pipeline_name,
            path = ?self.path,
            rows = data.row_count(),
            "Wrote JSON output"
        );
        Ok(true)
    }
}
