// sluice-core/src/infrastructure/config/project.rs

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::quality::QualityThresholds;
use crate::infrastructure::error::InfrastructureError;

const CANDIDATES: [&str; 2] = ["sluice_project_conf.yaml", "sluice.yaml"];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Validate)]
pub struct MonitoringConfig {
    #[serde(default)]
    #[validate(nested)]
    pub thresholds: QualityThresholds,

    #[serde(rename = "health-window-hours", default = "default_health_window")]
    #[validate(range(min = 1))]
    pub health_window_hours: i64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            thresholds: QualityThresholds::default(),
            health_window_hours: default_health_window(),
        }
    }
}

/// Deployment settings. Relative paths resolve against the project directory.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Validate)]
pub struct SluiceConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(rename = "registry-path", default = "default_registry_path")]
    pub registry_path: String,

    #[serde(rename = "store-path", default = "default_store_path")]
    pub store_path: String,

    #[serde(rename = "artifacts-path", default = "default_artifacts_path")]
    pub artifacts_path: String,

    #[serde(rename = "tick-interval-ms", default = "default_tick_ms")]
    #[validate(range(min = 10))]
    pub tick_interval_ms: u64,

    #[serde(rename = "shutdown-timeout-secs", default = "default_shutdown_secs")]
    pub shutdown_timeout_secs: u64,

    #[serde(rename = "execution-timeout-secs", default)]
    pub execution_timeout_secs: Option<u64>,

    #[serde(default)]
    #[validate(nested)]
    pub monitoring: MonitoringConfig,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            registry_path: default_registry_path(),
            store_path: default_store_path(),
            artifacts_path: default_artifacts_path(),
            tick_interval_ms: default_tick_ms(),
            shutdown_timeout_secs: default_shutdown_secs(),
            execution_timeout_secs: None,
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl SluiceConfig {
    pub fn registry_file(&self, root: &Path) -> PathBuf {
        resolve(root, &self.registry_path)
    }

    /// `:memory:` is passed through untouched.
    pub fn store_location(&self, root: &Path) -> String {
        if self.store_path == ":memory:" {
            return self.store_path.clone();
        }
        resolve(root, &self.store_path).to_string_lossy().into_owned()
    }

    pub fn artifacts_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.artifacts_path)
    }
}

fn resolve(root: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn default_name() -> String {
    "sluice".to_string()
}
fn default_registry_path() -> String {
    "schedules.yaml".to_string()
}
fn default_store_path() -> String {
    "sluice.duckdb".to_string()
}
fn default_artifacts_path() -> String {
    "target".to_string()
}
fn default_tick_ms() -> u64 {
    1000
}
fn default_shutdown_secs() -> u64 {
    5
}
fn default_health_window() -> i64 {
    24
}

/// Loads `sluice.yaml` from `project_dir`, falling back to defaults when absent.
#[instrument(skip(project_dir))]
pub fn load_config(project_dir: &Path) -> Result<SluiceConfig, InfrastructureError> {
    let mut config: SluiceConfig = match find_main_config(project_dir) {
        Some(path) => {
            info!(path = ?path, "Loading deployment config");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config at {:?}", path))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config YAML at {:?}", path))?
        }
        None => {
            info!(dir = ?project_dir, "No deployment config found, using defaults");
            SluiceConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn find_main_config(root: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|f| root.join(f))
        .find(|p| p.exists())
}

fn apply_env_overrides(config: &mut SluiceConfig) {
    // e.g. SLUICE_STORE_PATH=:memory: sluice run nightly
    if let Ok(val) = std::env::var("SLUICE_STORE_PATH") {
        info!(old = ?config.store_path, new = ?val, "Overriding store path via ENV");
        config.store_path = val;
    }
    if let Ok(val) = std::env::var("SLUICE_REGISTRY_PATH") {
        info!(old = ?config.registry_path, new = ?val, "Overriding registry path via ENV");
        config.registry_path = val;
    }
    if let Ok(val) = std::env::var("SLUICE_ARTIFACTS_PATH") {
        info!(old = ?config.artifacts_path, new = ?val, "Overriding artifacts path via ENV");
        config.artifacts_path = val;
    }
}
