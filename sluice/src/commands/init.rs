// sluice/src/commands/init.rs
//
// USE CASE: Scaffold a project with the reference schedules.

use anyhow::Context;
use std::path::Path;

use sluice_core::infrastructure::config::{SluiceConfig, init_default_registry};
use sluice_core::infrastructure::fs::atomic_write;

use super::Project;

pub fn execute(dir: &Path) -> anyhow::Result<()> {
    println!("🌱 Initializing sluice project in {}", dir.display());

    let config_path = dir.join("sluice.yaml");
    let has_config = ["sluice.yaml", "sluice_project_conf.yaml"]
        .iter()
        .any(|f| dir.join(f).exists());
    if has_config {
        println!("   ⏭️  Deployment config already present");
    } else {
        let yaml = serde_yaml::to_string(&SluiceConfig::default())?;
        atomic_write(&config_path, yaml)
            .with_context(|| format!("Failed to write {:?}", config_path))?;
        println!("   📝 Wrote {}", config_path.display());
    }

    let project = Project::load(dir)?;
    let registry = project.config.registry_file(&project.root);
    if init_default_registry(&registry)
        .with_context(|| format!("Failed to create registry at {:?}", registry))?
    {
        println!("   📝 Wrote reference schedules to {}", registry.display());
    } else {
        println!("   ⏭️  Registry already exists at {}", registry.display());
    }

    println!("✨ Project ready. Try 'sluice status'.");
    Ok(())
}
