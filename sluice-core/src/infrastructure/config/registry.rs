// sluice-core/src/infrastructure/config/registry.rs

//! Durable registry of scheduled pipelines, keyed by pipeline name.
//! YAML or JSON depending on the file extension.

use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{error, info, instrument};

use crate::domain::error::DomainError;
use crate::domain::schedule::ScheduledPipeline;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;

pub type Registry = BTreeMap<String, ScheduledPipeline>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

fn format_of(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
        _ => Format::Yaml,
    }
}

/// Loads every entry that parses. Broken entries are logged and skipped so one
/// bad definition does not take the whole scheduler down.
#[instrument]
pub fn load_registry(path: &Path) -> Result<Registry, InfrastructureError> {
    if !path.exists() {
        info!("No registry file, starting empty");
        return Ok(Registry::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read registry at {:?}", path))?;

    let parsed: Vec<(String, Result<ScheduledPipeline, String>)> = match format_of(path) {
        Format::Json => {
            let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)?;
            raw.into_iter()
                .map(|(name, v)| (name, serde_json::from_value(v).map_err(|e| e.to_string())))
                .collect()
        }
        Format::Yaml => {
            let raw: Option<BTreeMap<String, serde_yaml::Value>> = serde_yaml::from_str(&content)?;
            raw.unwrap_or_default()
                .into_iter()
                .map(|(name, v)| (name, serde_yaml::from_value(v).map_err(|e| e.to_string())))
                .collect()
        }
    };

    let mut registry = Registry::new();
    for (name, entry) in parsed {
        match entry {
            Ok(mut pipeline) => {
                pipeline.name = name.clone();
                registry.insert(name, pipeline);
            }
            Err(reason) => {
                let err = DomainError::Configuration(format!(
                    "Skipping pipeline '{}': {}",
                    name, reason
                ));
                error!(pipeline = %name, "{}", err);
            }
        }
    }

    info!(count = registry.len(), "Loaded pipeline registry");
    Ok(registry)
}

pub fn save_registry(path: &Path, registry: &Registry) -> Result<(), InfrastructureError> {
    let content = match format_of(path) {
        Format::Json => serde_json::to_string_pretty(registry)?,
        Format::Yaml => serde_yaml::to_string(registry)?,
    };
    atomic_write(path, content)
}

const DEFAULT_REGISTRY: &str = r#"
library_daily_sync:
  pipeline:
    extractors:
      - name: library_transactions_extractor
        class: duckdb
        database: library.duckdb
        query: >-
          SELECT * FROM transactions
          WHERE transaction_date >= current_date - INTERVAL 1 DAY
    transformers:
      - name: library_transactions_cleaner
        class: cleaner
        auto_clean: true
      - name: library_transactions_gate
        class: quality_gate
        rules:
          - name: transaction_id_present
            type: not_null
            column: transaction_id
            severity: error
          - name: transaction_id_unique
            type: unique
            column: transaction_id
    loaders:
      - name: transactions_staging_loader
        class: duckdb
        database: library.duckdb
        table: transactions_staging
        mode: replace
    config:
      stop_on_error: true
      max_retries: 1
    quality:
      table_name: transactions_staging
  schedule:
    type: daily
    time: "02:00"
  enabled: true
library_weekly_cleanup:
  pipeline:
    extractors:
      - name: library_full_extractor
        class: duckdb
        database: library.duckdb
        query: SELECT * FROM members
    transformers:
      - name: library_data_cleaner
        class: cleaner
        auto_clean: true
        cleaning_rules:
          - type: remove_nulls
            threshold: 0.8
          - type: standardize_email
            column: member_email
          - type: standardize_phone
            column: member_phone
    loaders:
      - name: cleaned_data_backup
        class: json
        path: data/processed/library_cleaned.json
  schedule:
    type: weekly
    day: sunday
    time: "01:00"
  enabled: true
"#;

/// The two reference schedules, a daily sync and a weekly cleanup.
pub fn default_registry() -> Result<Registry, InfrastructureError> {
    let mut registry: Registry = serde_yaml::from_str(DEFAULT_REGISTRY)?;
    for (name, pipeline) in registry.iter_mut() {
        pipeline.name = name.clone();
    }
    Ok(registry)
}

/// Writes the reference schedules unless a registry already exists. Returns whether it wrote.
pub fn init_default_registry(path: &Path) -> Result<bool, InfrastructureError> {
    if path.exists() {
        return Ok(false);
    }
    save_registry(path, &default_registry()?)?;
    info!(path = ?path, "Created default pipeline registry");
    Ok(true)
}
