use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use sluice_core::application::{PipelineDeps, SchedulerSettings};
use sluice_core::domain::pipeline::{
    ComponentConfig, ComponentStatus, ExecutionStatus, ExtractorKind, LoaderKind, PipelineConfig,
    PipelinePolicy, TransformerKind,
};
use sluice_core::domain::quality::{
    Alert, AlertLevel, MetricType, QualityRule, QualityThresholds, RuleKind, Severity,
};
use sluice_core::domain::schedule::{RunStatus, ScheduleSpec};
use sluice_core::infrastructure::adapters::DuckDbStore;
use sluice_core::infrastructure::config::Registry;
use sluice_core::ports::store::{AlertFilter, QualityStore};
use sluice_core::{ExecutionOutcome, PipelineScheduler, QualityMonitor, SchedulerHandle, Value};

/// A scheduler over an in-memory store, with the trigger loop switched off.
struct SchedulerTestEnv {
    dir: TempDir,
    store: Arc<dyn QualityStore>,
    handle: SchedulerHandle,
}

impl SchedulerTestEnv {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn QualityStore> = Arc::new(DuckDbStore::in_memory()?);
        let monitor = QualityMonitor::new(Arc::clone(&store), QualityThresholds::default());
        let deps = PipelineDeps {
            monitor: Some(monitor),
            artifacts_dir: Some(dir.path().join("target")),
            ..PipelineDeps::default()
        };
        let settings = SchedulerSettings {
            tick_interval: Duration::from_millis(50),
            shutdown_timeout: Duration::from_secs(5),
            auto_trigger: false,
        };
        let handle = PipelineScheduler::new(
            dir.path().join("schedules.yaml"),
            Registry::new(),
            Arc::clone(&store),
            deps,
            settings,
        )
        .spawn();
        Ok(Self { dir, store, handle })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }
}

fn members() -> ExtractorKind {
    ExtractorKind::Inline {
        columns: vec!["id".into(), "email".into()],
        rows: vec![
            vec![Value::Int(1), Value::Text("ada@example.com".into())],
            vec![Value::Int(2), Value::Null],
            vec![Value::Int(3), Value::Text("grace@example.com".into())],
        ],
    }
}

fn json_sink(name: &str, path: &Path) -> ComponentConfig<LoaderKind> {
    ComponentConfig {
        name: name.into(),
        kind: LoaderKind::Json {
            path: path.to_path_buf(),
        },
    }
}

/// Inline members, a strict gate that rejects the null email, two JSON sinks.
fn gated_pipeline(env: &SchedulerTestEnv, stop_on_error: bool) -> PipelineConfig {
    PipelineConfig {
        extractors: vec![ComponentConfig {
            name: "members".into(),
            kind: members(),
        }],
        transformers: vec![ComponentConfig {
            name: "email_gate".into(),
            kind: TransformerKind::QualityGate {
                rules: vec![QualityRule::new(
                    "email_present",
                    Severity::Error,
                    RuleKind::NotNull {
                        column: "email".into(),
                    },
                )],
                strict: true,
            },
        }],
        loaders: vec![
            json_sink("primary", &env.path("primary.json")),
            json_sink("backup", &env.path("backup.json")),
        ],
        config: PipelinePolicy {
            stop_on_error,
            ..PipelinePolicy::default()
        },
        quality: None,
    }
}

fn clean_pipeline(env: &SchedulerTestEnv) -> PipelineConfig {
    PipelineConfig {
        extractors: vec![ComponentConfig {
            name: "members".into(),
            kind: members(),
        }],
        transformers: vec![],
        loaders: vec![json_sink("out", &env.path("out.json"))],
        config: PipelinePolicy::default(),
        quality: None,
    }
}

#[tokio::test]
async fn test_stop_on_error_halts_after_failing_component() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    env.handle
        .add_pipeline("gated", gated_pipeline(&env, true), ScheduleSpec::every_minutes(60), true)
        .await?;

    let outcome = env.handle.execute_pipeline("gated").await?;
    let ExecutionOutcome::Failed { execution, error } = outcome else {
        anyhow::bail!("expected a failed run, got {}", outcome.as_str());
    };
    assert!(error.starts_with("Data quality validation failed"), "{error}");

    let execution = execution.ok_or_else(|| anyhow::anyhow!("no execution record"))?;
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let ran: Vec<&str> = execution
        .component_metrics
        .iter()
        .filter(|m| m.status == ComponentStatus::Completed)
        .map(|m| m.component_name.as_str())
        .collect();
    assert_eq!(ran, vec!["members"]);
    assert!(!env.path("primary.json").exists());
    assert!(!env.path("backup.json").exists());

    env.handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_lenient_run_accounts_for_every_component() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    env.handle
        .add_pipeline("gated", gated_pipeline(&env, false), ScheduleSpec::every_minutes(60), true)
        .await?;

    let outcome = env.handle.execute_pipeline("gated").await?;
    let execution = outcome
        .execution()
        .ok_or_else(|| anyhow::anyhow!("no execution record"))?;

    assert_eq!(execution.total_components, 4);
    assert_eq!(
        execution.successful_components + execution.failed_components,
        execution.total_components
    );
    assert_eq!(execution.failed_components, 3);
    let skipped = execution
        .component_metrics
        .iter()
        .filter(|m| m.errors.iter().any(|e| e.contains("upstream component 'email_gate'")))
        .count();
    assert_eq!(skipped, 2);

    env.handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_completeness_breach_raises_tiered_alerts() -> Result<()> {
    let store: Arc<dyn QualityStore> = Arc::new(DuckDbStore::in_memory()?);
    let monitor = QualityMonitor::new(Arc::clone(&store), QualityThresholds::default());

    let emails = |non_null: usize| {
        let rows = (0..100)
            .map(|i| {
                vec![if i < non_null {
                    Value::Text(format!("member{i}@example.com"))
                } else {
                    Value::Null
                }]
            })
            .collect();
        sluice_core::Dataset::from_rows(vec!["email"], rows)
    };

    let levels = |pipeline: &str| -> Result<Vec<AlertLevel>> {
        let filter = AlertFilter {
            acknowledged: false,
            level: None,
            pipeline: Some(pipeline.to_string()),
            limit: 100,
        };
        Ok(store
            .alerts(&filter)?
            .into_iter()
            .filter(|a| a.alert.metric_name == "completeness_email")
            .map(|a| a.alert.level)
            .collect())
    };

    let metrics = monitor.analyze("ninety", None, &emails(90), None)?;
    let email = metrics
        .iter()
        .find(|m| m.name == "completeness_email")
        .ok_or_else(|| anyhow::anyhow!("missing completeness metric"))?;
    assert!((email.value - 0.90).abs() < 1e-9);
    assert!(email.failed());
    assert_eq!(levels("ninety")?, vec![AlertLevel::Warning]);

    monitor.analyze("forty", None, &emails(40), None)?;
    assert_eq!(levels("forty")?, vec![AlertLevel::Critical]);
    Ok(())
}

#[tokio::test]
async fn test_reinserted_alert_replaces_existing_record() -> Result<()> {
    let store = DuckDbStore::in_memory()?;
    let at = Utc::now();
    let mut alert = Alert {
        id: Alert::make_id("lib", "completeness_email", &at),
        level: AlertLevel::Warning,
        title: "Quality alert: completeness_email".into(),
        message: "completeness_email is 0.900 (threshold 0.950)".into(),
        pipeline_name: "lib".into(),
        metric_name: "completeness_email".into(),
        threshold: 0.95,
        actual_value: 0.90,
        timestamp: at,
        acknowledged: false,
    };
    store.upsert_alert(&alert)?;
    alert.level = AlertLevel::Error;
    alert.actual_value = 0.70;
    store.upsert_alert(&alert)?;

    let all = store.alerts(&AlertFilter {
        acknowledged: false,
        level: None,
        pipeline: None,
        limit: 100,
    })?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].alert.level, AlertLevel::Error);
    assert!((all[0].alert.actual_value - 0.70).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_manual_runs_execute_once() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    env.handle
        .add_pipeline("sync", clean_pipeline(&env), ScheduleSpec::every_minutes(60), true)
        .await?;

    let (first, second) = tokio::join!(
        env.handle.execute_pipeline("sync"),
        env.handle.execute_pipeline("sync")
    );
    let outcomes = [first?, second?];
    let completed = outcomes.iter().filter(|o| o.is_success()).count();
    let refused = outcomes
        .iter()
        .filter(|o| matches!(o, ExecutionOutcome::AlreadyRunning))
        .count();
    assert_eq!((completed, refused), (1, 1));

    assert!(env.handle.stop().await?);
    assert_eq!(env.store.execution_count("sync")?, 1);
    Ok(())
}

#[tokio::test]
async fn test_health_is_neutral_for_unseen_pipeline() -> Result<()> {
    let store: Arc<dyn QualityStore> = Arc::new(DuckDbStore::in_memory()?);
    let monitor = QualityMonitor::new(store, QualityThresholds::default());
    assert_eq!(monitor.health_score("never_ran", None)?, 1.0);
    Ok(())
}

#[tokio::test]
async fn test_disable_preserves_counters_and_stops_triggers() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    env.handle
        .add_pipeline("sync", clean_pipeline(&env), ScheduleSpec::every_minutes(60), true)
        .await?;
    assert!(env.handle.execute_pipeline("sync").await?.is_success());

    let before = env.handle.status(Some("sync")).await?.remove(0);
    env.handle.disable("sync").await?;
    let after = env.handle.status(Some("sync")).await?.remove(0);

    assert!(!after.enabled);
    assert_eq!(after.next_run, None);
    assert_eq!(
        (after.run_count, after.success_count, after.failure_count),
        (before.run_count, before.success_count, before.failure_count)
    );
    assert!(matches!(
        env.handle.execute("sync", false).await?,
        ExecutionOutcome::Disabled
    ));

    env.handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_quality_block_feeds_monitor_and_metrics() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    let mut config = clean_pipeline(&env);
    config.quality = Some(Default::default());
    env.handle
        .add_pipeline("monitored", config, ScheduleSpec::every_minutes(60), true)
        .await?;

    let outcome = env.handle.execute_pipeline("monitored").await?;
    let execution = outcome
        .execution()
        .ok_or_else(|| anyhow::anyhow!("no execution record"))?;
    let health = execution
        .health_score
        .ok_or_else(|| anyhow::anyhow!("no health score"))?;
    assert!(health > 0.0 && health <= 1.0);
    assert!(
        env.path("target")
            .join("executions")
            .join(format!("{}.json", execution.execution_id))
            .exists()
    );

    let emails_alerted = env
        .store
        .alerts(&AlertFilter {
            acknowledged: false,
            level: None,
            pipeline: Some("monitored".into()),
            limit: 100,
        })?
        .iter()
        .any(|a| a.alert.metric_name == "completeness_email");
    assert!(emails_alerted);

    let metrics = env.handle.metrics(Some("monitored"), 7).await?;
    assert_eq!(metrics.executions.len(), 1);
    assert_eq!(metrics.executions[0].total_executions, 1);
    assert_eq!(metrics.executions[0].total_records_processed, 3);
    assert!(metrics.latest.iter().any(|m| m.metric_name == "success_rate"));

    env.handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_finished_run_returns_to_scheduled() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    env.handle
        .add_pipeline("sync", clean_pipeline(&env), ScheduleSpec::every_minutes(60), true)
        .await?;
    env.handle
        .add_pipeline("gated", gated_pipeline(&env, true), ScheduleSpec::every_minutes(60), true)
        .await?;

    assert!(env.handle.execute_pipeline("sync").await?.is_success());
    assert!(!env.handle.execute_pipeline("gated").await?.is_success());

    let sync = env.handle.status(Some("sync")).await?.remove(0);
    assert_eq!(sync.status, RunStatus::Scheduled);
    assert_eq!(sync.last_status, Some(RunStatus::Completed));

    let gated = env.handle.status(Some("gated")).await?.remove(0);
    assert_eq!(gated.status, RunStatus::Scheduled);
    assert_eq!(gated.last_status, Some(RunStatus::Failed));

    // A second run is accepted once the first has finished.
    assert!(env.handle.execute_pipeline("sync").await?.is_success());
    assert_eq!(env.handle.status(Some("sync")).await?[0].run_count, 2);

    env.handle.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_lenient_gate_failure_is_stored_and_alerted() -> Result<()> {
    let env = SchedulerTestEnv::new()?;
    let mut config = gated_pipeline(&env, false);
    if let TransformerKind::QualityGate { strict, .. } = &mut config.transformers[0].kind {
        *strict = false;
    }
    env.handle
        .add_pipeline("lenient", config, ScheduleSpec::every_minutes(60), true)
        .await?;

    let outcome = env.handle.execute_pipeline("lenient").await?;
    assert!(outcome.is_success(), "{}", outcome.as_str());
    assert!(env.path("primary.json").exists());

    let summary = env
        .store
        .metric_summary(Some("lenient"), Utc::now() - chrono::Duration::hours(1))?;
    assert!(
        summary
            .iter()
            .any(|s| s.metric_type == MetricType::Accuracy && s.passed_checks < s.total_checks)
    );

    let alerts = env.store.alerts(&AlertFilter {
        acknowledged: false,
        level: None,
        pipeline: Some("lenient".into()),
        limit: 100,
    })?;
    assert!(
        alerts
            .iter()
            .any(|a| a.alert.metric_name == "accuracy_email_present")
    );

    env.handle.stop().await?;
    Ok(())
}
