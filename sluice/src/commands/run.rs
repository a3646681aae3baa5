// sluice/src/commands/run.rs
//
// USE CASE: Run one pipeline now, outside its schedule.

use std::path::Path;

use sluice_core::ExecutionOutcome;
use sluice_core::domain::pipeline::Execution;

use super::{Project, table};

pub async fn execute(dir: &Path, name: &str) -> anyhow::Result<()> {
    let project = Project::load(dir)?;
    println!("⚙️  Project: {}", project.config.name);

    let scheduler = project.scheduler(false)?;
    println!("🚀 Running pipeline '{}'...", name);
    let outcome = scheduler.execute_pipeline(name).await;
    scheduler.stop().await?;

    match outcome? {
        ExecutionOutcome::Completed(execution) => {
            print_execution(&execution);
            println!(
                "\n✨ SUCCESS! '{}' finished in {:.2}s ({} records)",
                name,
                execution.duration_seconds,
                execution.records_processed()
            );
        }
        ExecutionOutcome::Failed { execution, error } => {
            if let Some(execution) = execution {
                print_execution(&execution);
            }
            eprintln!("\n❌ FAILURE: {}", error);
            std::process::exit(1);
        }
        ExecutionOutcome::NotFound => {
            eprintln!("❌ Pipeline '{}' is not registered", name);
            std::process::exit(1);
        }
        other => {
            eprintln!("⚠️  Pipeline '{}' did not run: {}", name, other.as_str());
            std::process::exit(1);
        }
    }
    Ok(())
}

fn print_execution(execution: &Execution) {
    let mut t = table(vec!["Component", "Role", "Status", "Records", "Attempts", "Seconds", "Notes"]);
    for m in &execution.component_metrics {
        let notes = m
            .errors
            .iter()
            .chain(m.warnings.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        t.add_row(vec![
            m.component_name.clone(),
            m.role.to_string(),
            format!("{:?}", m.status).to_lowercase(),
            m.records_processed.to_string(),
            m.attempts.to_string(),
            format!("{:.3}", m.duration_seconds),
            notes,
        ]);
    }
    println!("{t}");
    println!("   Execution: {}", execution.execution_id);
    if let Some(score) = execution.health_score {
        println!("   Health:    {:.3}", score);
    }
}
