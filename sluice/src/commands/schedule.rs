// sluice/src/commands/schedule.rs
//
// USE CASE: Run the scheduling loop in the foreground.

use anyhow::Context;
use std::path::Path;

use super::{Project, status};

pub async fn execute(dir: &Path) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let scheduler = project.scheduler(true)?;

    let summary = scheduler.summary().await?;
    println!(
        "⏰ Scheduler running: {} pipelines, {} active. Press Ctrl-C to stop.",
        summary.total_pipelines, summary.active_pipelines
    );
    status::print(&scheduler.status(None).await?);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("\n🛑 Stopping scheduler (in-flight runs are allowed to finish)...");
    if scheduler.stop().await? {
        println!("✨ Scheduler stopped cleanly");
    } else {
        println!("⚠️  Shutdown timeout reached, exiting anyway");
    }
    Ok(())
}
