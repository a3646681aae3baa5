// sluice/src/main.rs

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug sluice run ... to see component-level details
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = cli.project_dir;

    match cli.command {
        Commands::Init => commands::init::execute(&dir)?,
        Commands::Run { name } => commands::run::execute(&dir, &name).await?,
        Commands::Schedule => commands::schedule::execute(&dir).await?,
        Commands::Status { name } => commands::status::execute(&dir, name.as_deref()).await?,
        Commands::Enable { name } => commands::toggle::execute(&dir, &name, true).await?,
        Commands::Disable { name } => commands::toggle::execute(&dir, &name, false).await?,
        Commands::Alerts {
            level,
            acknowledged,
        } => commands::alerts::list(&dir, level, acknowledged)?,
        Commands::Ack { id, by } => commands::alerts::acknowledge(&dir, &id, &by)?,
        Commands::Report {
            pipeline,
            days,
            json,
        } => commands::report::execute(&dir, pipeline.as_deref(), days, json)?,
        Commands::Health { name } => commands::report::health(&dir, &name)?,
        Commands::Metrics { pipeline, days } => {
            commands::metrics::execute(&dir, pipeline.as_deref(), days).await?
        }
    }

    Ok(())
}
