// sluice/src/commands/alerts.rs

use std::path::Path;

use sluice_core::domain::quality::AlertLevel;

use super::{Project, table};

pub fn list(dir: &Path, level: Option<AlertLevel>, acknowledged: bool) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let alerts = project.monitor()?.alerts(acknowledged, level)?;

    if alerts.is_empty() {
        if acknowledged {
            println!("📭 No acknowledged alerts");
        } else {
            println!("✅ No active alerts");
        }
        return Ok(());
    }

    let mut t = table(vec!["Id", "Level", "Pipeline", "Metric", "Actual", "Threshold", "Raised"]);
    for record in &alerts {
        let a = &record.alert;
        t.add_row(vec![
            a.id.clone(),
            a.level.to_string(),
            a.pipeline_name.clone(),
            a.metric_name.clone(),
            format!("{:.3}", a.actual_value),
            format!("{:.3}", a.threshold),
            a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{t}");
    println!("🔔 {} alert(s)", alerts.len());
    Ok(())
}

pub fn acknowledge(dir: &Path, id: &str, by: &str) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    if project.monitor()?.acknowledge_alert(id, by)? {
        println!("✅ Alert {} acknowledged by {}", id, by);
        Ok(())
    } else {
        eprintln!("❌ No alert with id '{}'", id);
        std::process::exit(1);
    }
}
