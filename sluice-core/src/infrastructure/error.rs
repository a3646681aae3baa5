// sluice-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(sluice::infra::database::duckdb),
        help("An error occurred inside the SQL engine.")
    )]
    DuckDB(#[from] duckdb::Error),

    #[error("Unexpected value in column '{column}': {reason}")]
    #[diagnostic(code(sluice::infra::database::decode))]
    Decode { column: String, reason: String },
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- DATABASE (Abstracted) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    #[error("Store lock poisoned")]
    #[diagnostic(
        code(sluice::infra::lock_poisoned),
        help("A writer panicked while holding the store connection. Restart the process.")
    )]
    LockPoisoned,

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(sluice::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML / JSON ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(sluice::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(sluice::infra::json))]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(sluice::infra::config))]
    ConfigError(String),

    #[error("Configuration not found at '{0}'")]
    #[diagnostic(code(sluice::infra::config_missing))]
    ConfigNotFound(String),

    #[error("Invalid configuration values: {0}")]
    #[diagnostic(
        code(sluice::infra::validation),
        help("Quality thresholds are ratios between 0 and 1; timeliness is a positive number of hours.")
    )]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// Manual implementation for shortcuts (e.g. `?` operator on duckdb calls)
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDB(err))
    }
}
