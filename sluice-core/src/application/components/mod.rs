// sluice-core/src/application/components/mod.rs

//! Built-in components and the mapping from configuration variants to them.

pub mod cleaner;
pub mod enricher;
pub mod inline;
pub mod quality_gate;

pub use cleaner::Cleaner;
pub use enricher::Enricher;
pub use inline::InlineExtractor;
pub use quality_gate::QualityGate;

use crate::application::monitor::QualityMonitor;
use crate::domain::dataset::Dataset;
use crate::domain::error::DomainError;
use crate::domain::pipeline::{ExtractorKind, LoaderKind, TransformerKind};
use crate::infrastructure::adapters::{DuckDbExtractor, DuckDbLoader, JsonLoader};
use crate::ports::component::{Extractor, Loader, Transformer};

pub fn build_extractor(kind: &ExtractorKind) -> Result<Box<dyn Extractor>, DomainError> {
    Ok(match kind {
        ExtractorKind::Inline { columns, rows } => Box::new(InlineExtractor::new(
            Dataset::from_rows(columns.clone(), rows.clone()),
        )),
        ExtractorKind::DuckDb { database, query } => {
            Box::new(DuckDbExtractor::new(database.clone(), query.clone()))
        }
    })
}

/// Quality gates record their results through `monitor` when one is given.
pub fn build_transformer(
    name: &str,
    kind: &TransformerKind,
    monitor: Option<&QualityMonitor>,
) -> Result<Box<dyn Transformer>, DomainError> {
    Ok(match kind {
        TransformerKind::Cleaner {
            auto_clean,
            cleaning_rules,
        } => Box::new(Cleaner::new(*auto_clean, cleaning_rules.clone())?),
        TransformerKind::Enricher { enrichment_rules } => {
            Box::new(Enricher::new(enrichment_rules.clone())?)
        }
        TransformerKind::QualityGate { rules, strict } => {
            let gate = QualityGate::new(name, rules.clone(), *strict)?;
            match monitor {
                Some(monitor) => Box::new(gate.with_monitor(monitor.clone())),
                None => Box::new(gate),
            }
        }
    })
}

pub fn build_loader(kind: &LoaderKind) -> Result<Box<dyn Loader>, DomainError> {
    Ok(match kind {
        LoaderKind::DuckDb {
            database,
            table,
            mode,
        } => Box::new(DuckDbLoader::new(database.clone(), table.clone(), *mode)),
        LoaderKind::Json { path } => Box::new(JsonLoader::new(path.clone())),
    })
}
