// sluice/src/commands/mod.rs

pub mod alerts;
pub mod init;
pub mod metrics;
pub mod report;
pub mod run;
pub mod schedule;
pub mod status;
pub mod toggle;

use anyhow::Context;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sluice_core::infrastructure::adapters::DuckDbStore;
use sluice_core::infrastructure::config::{SluiceConfig, load_config};
use sluice_core::ports::store::QualityStore;
use sluice_core::{PipelineScheduler, QualityMonitor, SchedulerHandle};

/// Deployment config resolved against its directory.
pub struct Project {
    pub root: PathBuf,
    pub config: SluiceConfig,
}

impl Project {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config = load_config(dir)
            .with_context(|| format!("Failed to load configuration from {:?}", dir))?;
        Ok(Self {
            root: dir.to_path_buf(),
            config,
        })
    }

    pub fn monitor(&self) -> anyhow::Result<QualityMonitor> {
        let location = self.config.store_location(&self.root);
        let store: Arc<dyn QualityStore> = Arc::new(
            DuckDbStore::open(&location)
                .with_context(|| format!("Failed to open quality store at {}", location))?,
        );
        Ok(
            QualityMonitor::new(store, self.config.monitoring.thresholds.clone())
                .with_health_window(self.config.monitoring.health_window_hours),
        )
    }

    /// Starts the scheduler actor. With `auto_trigger` off only explicit requests run.
    pub fn scheduler(&self, auto_trigger: bool) -> anyhow::Result<SchedulerHandle> {
        let mut scheduler = PipelineScheduler::open(&self.root, &self.config)
            .context("Failed to initialize the pipeline scheduler")?;
        scheduler.settings_mut().auto_trigger = auto_trigger;
        Ok(scheduler.spawn())
    }
}

pub fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn pct(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}
