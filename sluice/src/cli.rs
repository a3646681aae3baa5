// sluice/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sluice_core::domain::quality::AlertLevel;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Scheduled ETL pipelines with data-quality monitoring", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project directory (holds sluice.yaml and the schedule registry)
    #[arg(long, global = true, default_value = ".", env = "SLUICE_PROJECT_DIR")]
    pub project_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🌱 Writes the reference schedules and a default sluice.yaml
    Init,

    /// 🚀 Runs one registered pipeline now
    Run {
        /// Registry name of the pipeline
        name: String,
    },

    /// ⏰ Starts the scheduling loop until Ctrl-C
    Schedule,

    /// 📋 Shows registry entries with counters and next run
    Status {
        name: Option<String>,
    },

    /// ✅ Re-enables automatic triggering
    Enable {
        name: String,
    },

    /// ⏸️  Stops automatic triggering (counters are kept)
    Disable {
        name: String,
    },

    /// 🚨 Lists quality alerts, newest first
    Alerts {
        /// Only this level: info | warning | error | critical
        #[arg(long, value_parser = parse_level)]
        level: Option<AlertLevel>,

        /// Show acknowledged alerts instead of active ones
        #[arg(long)]
        acknowledged: bool,
    },

    /// 👍 Acknowledges an alert
    Ack {
        id: String,

        #[arg(long, default_value = "cli")]
        by: String,
    },

    /// 📊 Quality report over a trailing window
    Report {
        #[arg(long)]
        pipeline: Option<String>,

        #[arg(long, default_value = "7")]
        days: i64,

        /// Print the raw report as JSON
        #[arg(long)]
        json: bool,
    },

    /// ❤️  Computes and stores the current health score of a pipeline
    Health {
        name: String,
    },

    /// 📈 Execution history and scheduler metrics
    Metrics {
        #[arg(long)]
        pipeline: Option<String>,

        #[arg(long, default_value = "7")]
        days: i64,
    },
}

fn parse_level(raw: &str) -> Result<AlertLevel, String> {
    AlertLevel::parse(raw).ok_or_else(|| {
        format!("unknown level '{raw}' (expected info, warning, error or critical)")
    })
}
