// sluice/src/commands/status.rs

use chrono::{DateTime, Utc};
use std::path::Path;

use sluice_core::application::PipelineStatus;

use super::{Project, pct, table};

pub async fn execute(dir: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let scheduler = project.scheduler(false)?;
    let result = scheduler.status(name).await;
    scheduler.stop().await?;

    let statuses = result?;
    if statuses.is_empty() {
        println!("📭 No pipelines registered. Run 'sluice init' to add the reference schedules.");
        return Ok(());
    }
    print(&statuses);
    Ok(())
}

pub fn print(statuses: &[PipelineStatus]) {
    let mut t = table(vec![
        "Pipeline", "Enabled", "Status", "Last result", "Schedule", "Last run", "Next run", "Runs",
        "OK", "Failed", "Success",
    ]);
    for s in statuses {
        t.add_row(vec![
            s.name.clone(),
            if s.enabled { "yes" } else { "no" }.to_string(),
            s.status.as_str().to_string(),
            s.last_status.map_or("-", |l| l.as_str()).to_string(),
            s.schedule.clone(),
            stamp(s.last_run),
            stamp(s.next_run),
            s.run_count.to_string(),
            s.success_count.to_string(),
            s.failure_count.to_string(),
            pct(s.success_rate),
        ]);
    }
    println!("{t}");
}

fn stamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
