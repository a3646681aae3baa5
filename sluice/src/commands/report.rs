// sluice/src/commands/report.rs
//
// USE CASE: Summarise stored quality data over a trailing window.

use std::path::Path;

use sluice_core::QualityMonitor;

use super::{Project, pct, table};

pub fn execute(dir: &Path, pipeline: Option<&str>, days: i64, json: bool) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let report = project.monitor()?.quality_report(pipeline, days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let scope = report.pipeline.as_deref().unwrap_or("all pipelines");
    println!("📊 Quality report for {} (last {} days)", scope, report.period_days);
    println!(
        "   Quality score: {:.3}   Health score: {:.3}",
        report.summary.overall_quality_score, report.summary.overall_health_score
    );
    println!(
        "   Checks: {}/{} passed   Active alerts: {}",
        report.summary.passed_quality_checks,
        report.summary.total_quality_checks,
        report.summary.active_alerts
    );

    if !report.metrics.is_empty() {
        let mut t = table(vec!["Metric", "Checks", "Passed", "Pass rate", "Avg", "Min", "Max"]);
        for m in &report.metrics {
            t.add_row(vec![
                m.metric_type.to_string(),
                m.total_checks.to_string(),
                m.passed_checks.to_string(),
                pct(m.pass_rate),
                format!("{:.3}", m.avg_value),
                format!("{:.3}", m.min_value),
                format!("{:.3}", m.max_value),
            ]);
        }
        println!("{t}");
    }

    if !report.alerts.is_empty() {
        let counts = report
            .alerts
            .iter()
            .map(|a| format!("{} {}", a.count, a.level))
            .collect::<Vec<_>>()
            .join(", ");
        println!("🔔 Alerts: {}", counts);
    }

    if !report.health_trend.is_empty() {
        let mut t = table(vec!["Date", "Avg health"]);
        for point in &report.health_trend {
            t.add_row(vec![point.date.to_string(), format!("{:.3}", point.avg_health)]);
        }
        println!("{t}");
    }
    Ok(())
}

pub fn health(dir: &Path, name: &str) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    let monitor: QualityMonitor = project.monitor()?;
    let score = monitor.health_score(name, None)?;
    let badge = match score {
        s if s >= 0.9 => "🟢",
        s if s >= 0.7 => "🟡",
        _ => "🔴",
    };
    println!("{} Health of '{}': {:.3}", badge, name, score);
    Ok(())
}
