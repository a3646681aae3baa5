// sluice/src/commands/metrics.rs

use std::path::Path;

use super::{Project, pct, table};

pub async fn execute(dir: &Path, pipeline: Option<&str>, days: i64) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let scheduler = project.scheduler(false)?;
    let result = scheduler.metrics(pipeline, days).await;
    scheduler.stop().await?;
    let metrics = result?;

    println!(
        "📈 Scheduler: {} pipelines, {} active, {} running (last {} days)",
        metrics.summary.total_pipelines,
        metrics.summary.active_pipelines,
        metrics.summary.running_pipelines,
        metrics.period_days
    );

    if metrics.executions.is_empty() {
        println!("📭 No executions recorded in this window");
    } else {
        let mut t = table(vec!["Pipeline", "Runs", "Succeeded", "Success", "Avg seconds", "Records"]);
        for e in &metrics.executions {
            let rate = if e.total_executions == 0 {
                0.0
            } else {
                e.successful_executions as f64 / e.total_executions as f64
            };
            t.add_row(vec![
                e.pipeline_name.clone(),
                e.total_executions.to_string(),
                e.successful_executions.to_string(),
                pct(rate),
                format!("{:.2}", e.avg_duration),
                e.total_records_processed.to_string(),
            ]);
        }
        println!("{t}");
    }

    if !metrics.latest.is_empty() {
        let mut t = table(vec!["Pipeline", "Metric", "Value", "Recorded"]);
        for m in &metrics.latest {
            t.add_row(vec![
                m.pipeline_name.clone(),
                m.metric_name.clone(),
                format!("{:.3}", m.metric_value),
                m.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]);
        }
        println!("{t}");
    }
    Ok(())
}
