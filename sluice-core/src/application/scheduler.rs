// sluice-core/src/application/scheduler.rs

//! Scheduling actor.
//!
//! One task owns the registry, the trigger table and the running-set; every
//! mutation arrives as a [`Command`]. Membership in the running-set is checked and
//! claimed while handling a single command, so two requests for the same name
//! can never both start a run. Runs execute on their own tasks and report back on
//! a separate channel. Disk writes go to a [`Writer`] task, so the loop never
//! waits on the registry file or the store.

use chrono::{DateTime, NaiveDateTime, Utc};
use miette::Diagnostic;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::application::monitor::QualityMonitor;
use crate::application::orchestrator::{Pipeline, PipelineDeps};
use crate::application::writer::{Write, Writer};
use crate::domain::error::DomainError;
use crate::domain::pipeline::{Execution, PipelineConfig};
use crate::domain::schedule::{RunStatus, ScheduleSpec, ScheduledPipeline};
use crate::error::SluiceError;
use crate::infrastructure::adapters::DuckDbStore;
use crate::infrastructure::config::{Registry, SluiceConfig, load_registry};
use crate::ports::store::{ExecutionSummary, QualityStore, SchedulerMetric};

const COMMAND_BUFFER: usize = 64;

#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    #[error("Scheduler is not running")]
    #[diagnostic(
        code(sluice::scheduler::stopped),
        help("The scheduler task has shut down; start a new one.")
    )]
    Stopped,

    #[error("Pipeline '{0}' is not registered")]
    #[diagnostic(code(sluice::scheduler::not_found))]
    PipelineNotFound(String),

    #[error("Pipeline '{name}' rejected: {source}")]
    #[diagnostic(code(sluice::scheduler::invalid))]
    Invalid {
        name: String,
        #[source]
        source: DomainError,
    },
}

/// Result of an execute request. Only `Completed` and `Failed` mean a run happened.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    NotFound,
    Disabled,
    AlreadyRunning,
    Completed(Box<Execution>),
    Failed {
        execution: Option<Box<Execution>>,
        error: String,
    },
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::NotFound => "not_found",
            ExecutionOutcome::Disabled => "disabled",
            ExecutionOutcome::AlreadyRunning => "already_running",
            ExecutionOutcome::Completed(_) => "completed",
            ExecutionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn execution(&self) -> Option<&Execution> {
        match self {
            ExecutionOutcome::Completed(e) => Some(e.as_ref()),
            ExecutionOutcome::Failed { execution, .. } => execution.as_deref(),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub name: String,
    pub status: RunStatus,
    pub last_status: Option<RunStatus>,
    pub enabled: bool,
    pub schedule: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub total_pipelines: usize,
    pub active_pipelines: usize,
    pub running_pipelines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerMetrics {
    pub executions: Vec<ExecutionSummary>,
    pub latest: Vec<SchedulerMetric>,
    pub summary: SchedulerSummary,
    pub period_days: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub shutdown_timeout: Duration,
    /// When false the loop never fires triggers; only explicit requests run.
    pub auto_trigger: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            auto_trigger: true,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &SluiceConfig) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            auto_trigger: true,
        }
    }
}

enum Command {
    Add {
        entry: Box<ScheduledPipeline>,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    SetEnabled {
        name: String,
        enabled: bool,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Execute {
        name: String,
        manual: bool,
        reply: oneshot::Sender<Dispatch>,
    },
    Status {
        name: Option<String>,
        reply: oneshot::Sender<Result<Vec<PipelineStatus>, SchedulerError>>,
    },
    Summary {
        reply: oneshot::Sender<SchedulerSummary>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum Dispatch {
    Refused(ExecutionOutcome),
    Started(oneshot::Receiver<ExecutionOutcome>),
}

struct Finished {
    name: String,
    outcome: ExecutionOutcome,
    reply: Option<oneshot::Sender<ExecutionOutcome>>,
}

/// Registry plus the collaborators every run needs. Consumed by [`spawn`](Self::spawn).
pub struct PipelineScheduler {
    registry_path: PathBuf,
    registry: Registry,
    store: Arc<dyn QualityStore>,
    deps: PipelineDeps,
    settings: SchedulerSettings,
}

impl PipelineScheduler {
    pub fn new(
        registry_path: impl Into<PathBuf>,
        registry: Registry,
        store: Arc<dyn QualityStore>,
        mut deps: PipelineDeps,
        settings: SchedulerSettings,
    ) -> Self {
        deps.store = Some(Arc::clone(&store));
        Self {
            registry_path: registry_path.into(),
            registry,
            store,
            deps,
            settings,
        }
    }

    /// Wires the store, monitor and registry described by a deployment config.
    pub fn open(root: &Path, config: &SluiceConfig) -> Result<Self, SluiceError> {
        let store: Arc<dyn QualityStore> =
            Arc::new(DuckDbStore::open(&config.store_location(root))?);
        let monitor = QualityMonitor::new(Arc::clone(&store), config.monitoring.thresholds.clone())
            .with_health_window(config.monitoring.health_window_hours);
        let registry_path = config.registry_file(root);
        let registry = load_registry(&registry_path)?;

        let deps = PipelineDeps {
            store: None,
            monitor: Some(monitor),
            artifacts_dir: Some(config.artifacts_dir(root)),
            default_timeout_seconds: config.execution_timeout_secs,
        };

        Ok(Self::new(
            registry_path,
            registry,
            store,
            deps,
            SchedulerSettings::from_config(config),
        ))
    }

    pub fn settings_mut(&mut self) -> &mut SchedulerSettings {
        &mut self.settings
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let store = Arc::clone(&self.store);
        let shutdown_timeout = self.settings.shutdown_timeout;
        let writer = Writer::spawn(self.registry_path, self.store);

        let actor = Actor {
            registry: self.registry,
            writer: writer.clone(),
            deps: self.deps,
            settings: self.settings,
            running: HashSet::new(),
            triggers: HashMap::new(),
            done_tx,
        };
        let task = tokio::spawn(actor.run(rx, done_rx));

        SchedulerHandle {
            tx,
            store,
            writer,
            shutdown_timeout,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Cloneable front door to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    store: Arc<dyn QualityStore>,
    writer: Writer,
    shutdown_timeout: Duration,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SchedulerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }

    /// Registers (or replaces) an entry and persists the registry.
    pub async fn add_pipeline(
        &self,
        name: impl Into<String>,
        pipeline: PipelineConfig,
        schedule: ScheduleSpec,
        enabled: bool,
    ) -> Result<(), SchedulerError> {
        let mut entry = ScheduledPipeline::new(name, pipeline, schedule);
        entry.enabled = enabled;
        self.request(|reply| Command::Add {
            entry: Box::new(entry),
            reply,
        })
        .await?
    }

    pub async fn enable(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(name, true).await
    }

    /// Stops future triggers. Counters are left as they are.
    pub async fn disable(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), SchedulerError> {
        self.request(|reply| Command::SetEnabled {
            name: name.to_string(),
            enabled,
            reply,
        })
        .await?
    }

    /// Manual run: ignores the enabled flag, still refuses overlapping runs.
    pub async fn execute_pipeline(&self, name: &str) -> Result<ExecutionOutcome, SchedulerError> {
        self.execute(name, true).await
    }

    /// Waits for the run to finish and its bookkeeping to be applied.
    pub async fn execute(&self, name: &str, manual: bool) -> Result<ExecutionOutcome, SchedulerError> {
        let dispatch = self
            .request(|reply| Command::Execute {
                name: name.to_string(),
                manual,
                reply,
            })
            .await?;
        match dispatch {
            Dispatch::Refused(outcome) => Ok(outcome),
            Dispatch::Started(rx) => rx.await.map_err(|_| SchedulerError::Stopped),
        }
    }

    pub async fn status(&self, name: Option<&str>) -> Result<Vec<PipelineStatus>, SchedulerError> {
        self.request(|reply| Command::Status {
            name: name.map(str::to_string),
            reply,
        })
        .await?
    }

    pub async fn summary(&self) -> Result<SchedulerSummary, SchedulerError> {
        self.request(|reply| Command::Summary { reply }).await
    }

    /// Execution history over the trailing `days`, with the latest scheduler metrics.
    pub async fn metrics(&self, name: Option<&str>, days: i64) -> Result<SchedulerMetrics, SluiceError> {
        let summary = self.summary().await?;
        self.writer.flush().await;
        let store = Arc::clone(&self.store);
        let name = name.map(str::to_string);
        let since = Utc::now() - chrono::Duration::days(days);

        let (executions, latest) = tokio::task::spawn_blocking(move || {
            let executions = store.execution_summaries(name.as_deref(), since)?;
            let latest = store.latest_scheduler_metrics(name.as_deref())?;
            Ok::<_, SluiceError>((executions, latest))
        })
        .await
        .map_err(|e| SluiceError::InternalError(format!("metrics task aborted: {e}")))??;

        Ok(SchedulerMetrics {
            executions,
            latest,
            summary,
            period_days: days,
        })
    }

    /// Clears every trigger, lets in-flight runs finish, saves the registry.
    /// Returns false when the actor did not finish within the shutdown timeout;
    /// it keeps draining in the background in that case.
    pub async fn stop(&self) -> Result<bool, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).await.is_err() {
            return Ok(true);
        }

        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        let wait = async {
            let _ = rx.await;
            if let Some(task) = task {
                let _ = task.await;
            }
        };

        match tokio::time::timeout(self.shutdown_timeout, wait).await {
            Ok(()) => Ok(true),
            Err(_) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Scheduler did not stop in time, in-flight runs continue"
                );
                Ok(false)
            }
        }
    }
}

struct Actor {
    registry: Registry,
    writer: Writer,
    deps: PipelineDeps,
    settings: SchedulerSettings,
    running: HashSet<String>,
    triggers: HashMap<String, NaiveDateTime>,
    done_tx: mpsc::UnboundedSender<Finished>,
}

impl Actor {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Command>,
        mut done_rx: mpsc::UnboundedReceiver<Finished>,
    ) {
        // A run in progress when the last process exited never finished.
        for entry in self.registry.values_mut() {
            if entry.status == RunStatus::Running {
                entry.status = RunStatus::Scheduled;
            }
        }
        let names: Vec<String> = self.registry.keys().cloned().collect();
        for name in names {
            self.register_trigger(&name);
        }
        info!(
            pipelines = self.registry.len(),
            triggers = self.triggers.len(),
            "⏰ Scheduler started"
        );
        self.writer
            .log_event("scheduler_started", None, "Pipeline scheduler started");

        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                command = rx.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown(&mut done_rx).await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.shutdown(&mut done_rx).await;
                        return;
                    }
                },
                Some(finished) = done_rx.recv() => self.finish(finished),
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Add { entry, reply } => {
                let _ = reply.send(self.add(*entry));
            }
            Command::SetEnabled {
                name,
                enabled,
                reply,
            } => {
                let _ = reply.send(self.set_enabled(&name, enabled));
            }
            Command::Execute {
                name,
                manual,
                reply,
            } => {
                let _ = reply.send(self.dispatch(&name, manual));
            }
            Command::Status { name, reply } => {
                let _ = reply.send(self.status(name.as_deref()));
            }
            Command::Summary { reply } => {
                let _ = reply.send(self.summary());
            }
            // Handled by the loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn add(&mut self, mut entry: ScheduledPipeline) -> Result<(), SchedulerError> {
        let name = entry.name.clone();
        if let Err(source) = Pipeline::from_config(&name, &entry.pipeline, &PipelineDeps::default()) {
            return Err(SchedulerError::Invalid { name, source });
        }
        // Re-adding keeps the history of the entry it replaces.
        if let Some(previous) = self.registry.get(&name) {
            entry.run_count = previous.run_count;
            entry.success_count = previous.success_count;
            entry.failure_count = previous.failure_count;
            entry.last_run = previous.last_run;
            entry.last_status = previous.last_status;
        }
        info!(pipeline = %name, schedule = %entry.schedule, "Pipeline registered");
        self.registry.insert(name.clone(), entry);
        self.triggers.remove(&name);
        self.register_trigger(&name);
        self.save();
        Ok(())
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), SchedulerError> {
        let entry = self
            .registry
            .get_mut(name)
            .ok_or_else(|| SchedulerError::PipelineNotFound(name.to_string()))?;
        entry.enabled = enabled;

        if enabled {
            self.register_trigger(name);
            info!(pipeline = name, "Pipeline enabled");
        } else {
            self.triggers.remove(name);
            info!(pipeline = name, "Pipeline disabled");
        }
        self.save();
        Ok(())
    }

    fn register_trigger(&mut self, name: &str) {
        let Some(entry) = self.registry.get(name) else {
            return;
        };
        if !entry.enabled {
            return;
        }
        if !entry.schedule.is_supported() {
            warn!(
                pipeline = name,
                schedule = %entry.schedule,
                "Cron schedules are not evaluated, pipeline only runs manually"
            );
            return;
        }
        if let Some(next) = entry.schedule.next_after(Utc::now().naive_utc()) {
            self.triggers.insert(name.to_string(), next);
        }
    }

    fn tick(&mut self) {
        if !self.settings.auto_trigger {
            return;
        }
        let now = Utc::now().naive_utc();
        let due: Vec<String> = self
            .triggers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, _)| name.clone())
            .collect();

        for name in due {
            match self.registry.get(&name).and_then(|e| e.schedule.next_after(now)) {
                Some(next) => {
                    self.triggers.insert(name.clone(), next);
                }
                None => {
                    self.triggers.remove(&name);
                }
            }
            match self.start(&name, false, None) {
                Ok(()) => debug!(pipeline = %name, "Trigger fired"),
                Err(outcome) => {
                    info!(pipeline = %name, outcome = outcome.as_str(), "Trigger skipped")
                }
            }
        }
    }

    fn dispatch(&mut self, name: &str, manual: bool) -> Dispatch {
        let (tx, rx) = oneshot::channel();
        match self.start(name, manual, Some(tx)) {
            Ok(()) => Dispatch::Started(rx),
            Err(outcome) => Dispatch::Refused(outcome),
        }
    }

    /// Claims the running-set entry and spawns the run.
    fn start(
        &mut self,
        name: &str,
        manual: bool,
        reply: Option<oneshot::Sender<ExecutionOutcome>>,
    ) -> Result<(), ExecutionOutcome> {
        let Some(entry) = self.registry.get_mut(name) else {
            return Err(ExecutionOutcome::NotFound);
        };
        if !entry.enabled && !manual {
            return Err(ExecutionOutcome::Disabled);
        }
        if !self.running.insert(name.to_string()) {
            return Err(ExecutionOutcome::AlreadyRunning);
        }

        entry.mark_running(Utc::now());
        let config = entry.pipeline.clone();
        let deps = self.deps.clone();
        let done = self.done_tx.clone();
        let name = name.to_string();

        info!(pipeline = %name, manual, "Dispatching pipeline run");
        tokio::spawn(async move {
            let worker = tokio::spawn(run_once(name.clone(), config, deps));
            // The running-set entry is released on every path, panics included.
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => ExecutionOutcome::Failed {
                    execution: None,
                    error: format!("execution task aborted: {e}"),
                },
            };
            let _ = done.send(Finished {
                name,
                outcome,
                reply,
            });
        });
        Ok(())
    }

    fn finish(&mut self, finished: Finished) {
        let Finished {
            name,
            outcome,
            reply,
        } = finished;
        self.running.remove(&name);

        let success = outcome.is_success();
        let duration = outcome.execution().map(|e| e.duration_seconds).unwrap_or(0.0);

        // Removed while running; nothing left to update.
        if let Some(entry) = self.registry.get_mut(&name) {
            entry.mark_finished(success);
            self.writer.send(Write::Metrics {
                pipeline: name.clone(),
                metrics: vec![
                    ("duration_seconds", duration),
                    ("success_rate", entry.success_rate()),
                    ("total_runs", entry.run_count as f64),
                    ("total_failures", entry.failure_count as f64),
                ],
                at: Utc::now(),
            });
        }
        if let ExecutionOutcome::Failed { error, .. } = &outcome {
            self.writer
                .log_event("execution_error", Some(name.as_str()), error.clone());
        }
        self.save();

        if success {
            info!(pipeline = %name, "Scheduled run completed");
        } else {
            warn!(pipeline = %name, outcome = outcome.as_str(), "Scheduled run failed");
        }
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    fn status(&self, name: Option<&str>) -> Result<Vec<PipelineStatus>, SchedulerError> {
        let entries: Vec<&ScheduledPipeline> = match name {
            Some(n) => vec![
                self.registry
                    .get(n)
                    .ok_or_else(|| SchedulerError::PipelineNotFound(n.to_string()))?,
            ],
            None => self.registry.values().collect(),
        };

        Ok(entries
            .into_iter()
            .map(|e| PipelineStatus {
                name: e.name.clone(),
                status: e.status,
                last_status: e.last_status,
                enabled: e.enabled,
                schedule: e.schedule.to_string(),
                last_run: e.last_run,
                next_run: self
                    .triggers
                    .get(&e.name)
                    .map(|at| DateTime::<Utc>::from_naive_utc_and_offset(*at, Utc)),
                run_count: e.run_count,
                success_count: e.success_count,
                failure_count: e.failure_count,
                success_rate: e.success_rate(),
            })
            .collect())
    }

    fn summary(&self) -> SchedulerSummary {
        SchedulerSummary {
            total_pipelines: self.registry.len(),
            active_pipelines: self.registry.values().filter(|e| e.enabled).count(),
            running_pipelines: self.running.len(),
        }
    }

    async fn shutdown(&mut self, done_rx: &mut mpsc::UnboundedReceiver<Finished>) {
        self.triggers.clear();
        self.settings.auto_trigger = false;
        if !self.running.is_empty() {
            info!(in_flight = self.running.len(), "Waiting for in-flight runs");
        }
        while !self.running.is_empty() {
            match done_rx.recv().await {
                Some(finished) => self.finish(finished),
                None => break,
            }
        }
        self.save();
        self.writer
            .log_event("scheduler_stopped", None, "Pipeline scheduler stopped");
        self.writer.flush().await;
        info!("🛑 Scheduler stopped");
    }

    /// Queues a snapshot of the registry. The in-memory state stays authoritative.
    fn save(&self) {
        self.writer.save_registry(&self.registry);
    }
}

async fn run_once(name: String, config: PipelineConfig, deps: PipelineDeps) -> ExecutionOutcome {
    let pipeline = match Pipeline::from_config(&name, &config, &deps) {
        Ok(p) => p,
        Err(e) => {
            error!(pipeline = %name, error = %e, "Pipeline could not be built");
            return ExecutionOutcome::Failed {
                execution: None,
                error: e.to_string(),
            };
        }
    };

    match pipeline.execute().await {
        Ok(execution) if execution.is_success() => ExecutionOutcome::Completed(Box::new(execution)),
        Ok(execution) => ExecutionOutcome::Failed {
            error: execution
                .error
                .clone()
                .unwrap_or_else(|| "one or more components failed".to_string()),
            execution: Some(Box::new(execution)),
        },
        Err(failure) => ExecutionOutcome::Failed {
            error: failure.error.to_string(),
            execution: Some(failure.execution),
        },
    }
}
