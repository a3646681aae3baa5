// sluice/src/commands/toggle.rs
//
// USE CASE: Enable or disable a registered pipeline. Counters are kept.

use std::path::Path;

use sluice_core::application::SchedulerError;

use super::Project;

pub async fn execute(dir: &Path, name: &str, enabled: bool) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let scheduler = project.scheduler(false)?;
    let result = if enabled {
        scheduler.enable(name).await
    } else {
        scheduler.disable(name).await
    };
    scheduler.stop().await?;

    match result {
        Ok(()) if enabled => println!("✅ Pipeline '{}' enabled", name),
        Ok(()) => println!("⏸️  Pipeline '{}' disabled", name),
        Err(SchedulerError::PipelineNotFound(_)) => {
            eprintln!("❌ Pipeline '{}' is not registered", name);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
