// sluice-core/src/application/orchestrator.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::application::components::{build_extractor, build_loader, build_transformer};
use crate::application::monitor::QualityMonitor;
use crate::domain::dataset::Dataset;
use crate::domain::error::{BoxError, DataQualityError, DomainError, PipelineError};
use crate::domain::pipeline::{
    ComponentMetrics, ComponentRole, Execution, PipelineConfig, PipelinePolicy, QualityConfig,
};
use crate::domain::quality::QualityValidator;
use crate::error::SluiceError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;
use crate::ports::component::{Extractor, Loader, StageContext, Transformer};
use crate::ports::store::QualityStore;

/// A run that was aborted: `stop_on_error` halted it or the deadline passed.
/// The execution record is complete and has already been persisted.
#[derive(Error, Debug)]
#[error("Pipeline '{}' failed", .execution.pipeline_name)]
pub struct RunFailure {
    pub execution: Box<Execution>,
    #[source]
    pub error: PipelineError,
}

/// Collaborators shared by every pipeline built from configuration.
#[derive(Clone, Default)]
pub struct PipelineDeps {
    pub store: Option<Arc<dyn QualityStore>>,
    pub monitor: Option<QualityMonitor>,
    pub artifacts_dir: Option<PathBuf>,
    /// Deadline applied when the pipeline policy sets none.
    pub default_timeout_seconds: Option<u64>,
}

struct Named<T> {
    name: String,
    component: T,
}

struct QualityStage {
    monitor: QualityMonitor,
    table: String,
    validator: Option<QualityValidator>,
}

#[derive(Clone, Copy)]
enum Step<'a> {
    Extract(&'a dyn Extractor),
    Transform(&'a dyn Transformer),
    Load(&'a dyn Loader),
}

impl Step<'_> {
    fn role(self) -> ComponentRole {
        match self {
            Step::Extract(_) => ComponentRole::Extractor,
            Step::Transform(_) => ComponentRole::Transformer,
            Step::Load(_) => ComponentRole::Loader,
        }
    }
}

/// A step bound to its input.
#[derive(Clone, Copy)]
enum StageRef<'a> {
    Extract(&'a dyn Extractor),
    Transform(&'a dyn Transformer, &'a Dataset),
    Load(&'a dyn Loader, &'a Dataset),
}

impl StageRef<'_> {
    fn role(self) -> ComponentRole {
        match self {
            StageRef::Extract(_) => ComponentRole::Extractor,
            StageRef::Transform(..) => ComponentRole::Transformer,
            StageRef::Load(..) => ComponentRole::Loader,
        }
    }

    fn wrap(self, component: &str, source: BoxError) -> PipelineError {
        let component = component.to_string();
        match self {
            StageRef::Extract(_) => PipelineError::Extraction { component, source },
            StageRef::Transform(..) => PipelineError::Transformation { component, source },
            StageRef::Load(..) => PipelineError::Load { component, source },
        }
    }
}

enum StageOutput {
    Data(Dataset),
    Loaded(bool),
}

async fn invoke(stage: StageRef<'_>, ctx: &mut StageContext) -> Result<StageOutput, BoxError> {
    match stage {
        StageRef::Extract(e) => e.extract(ctx).await.map(StageOutput::Data),
        StageRef::Transform(t, data) => t.transform(data, ctx).await.map(StageOutput::Data),
        StageRef::Load(l, data) => l.load(data, ctx).await.map(StageOutput::Loaded),
    }
}

#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    seconds: u64,
}

/// Extract, transform*, load+ chain with retry, deadline and failure policy.
pub struct Pipeline {
    name: String,
    extractor: Named<Box<dyn Extractor>>,
    transformers: Vec<Named<Box<dyn Transformer>>>,
    loaders: Vec<Named<Box<dyn Loader>>>,
    policy: PipelinePolicy,
    store: Option<Arc<dyn QualityStore>>,
    quality: Option<Arc<QualityStage>>,
    artifacts_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    /// Resolves every component variant up front, so a bad definition fails here
    /// and never mid-run.
    pub fn from_config(
        name: &str,
        config: &PipelineConfig,
        deps: &PipelineDeps,
    ) -> Result<Self, DomainError> {
        config.check_shape(name)?;

        let mut builder = Pipeline::builder(name);
        for c in &config.extractors {
            builder = builder.boxed_extractor(&c.name, build_extractor(&c.kind)?);
        }
        for c in &config.transformers {
            let transformer = build_transformer(&c.name, &c.kind, deps.monitor.as_ref())?;
            builder = builder.boxed_transformer(&c.name, transformer);
        }
        for c in &config.loaders {
            builder = builder.boxed_loader(&c.name, build_loader(&c.kind)?);
        }

        let mut policy = config.config.clone();
        if policy.timeout_seconds.is_none() {
            policy.timeout_seconds = deps.default_timeout_seconds;
        }
        builder = builder.policy(policy);

        if let Some(store) = &deps.store {
            builder = builder.store(Arc::clone(store));
        }
        if let Some(dir) = &deps.artifacts_dir {
            builder = builder.artifacts_dir(dir.clone());
        }
        match (&config.quality, &deps.monitor) {
            (Some(quality), Some(monitor)) => {
                builder = builder.monitor(monitor.clone(), quality)?;
            }
            (Some(_), None) => {
                debug!(pipeline = name, "No quality monitor available, skipping quality block");
            }
            _ => {}
        }

        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    pub fn component_count(&self) -> usize {
        1 + self.transformers.len() + self.loaders.len()
    }

    fn steps(&self) -> Vec<(&str, Step<'_>)> {
        let mut steps = Vec::with_capacity(self.component_count());
        steps.push((
            self.extractor.name.as_str(),
            Step::Extract(self.extractor.component.as_ref()),
        ));
        for t in &self.transformers {
            steps.push((t.name.as_str(), Step::Transform(t.component.as_ref())));
        }
        for l in &self.loaders {
            steps.push((l.name.as_str(), Step::Load(l.component.as_ref())));
        }
        steps
    }

    /// Runs every stage in order.
    ///
    /// `Ok` is returned whenever the run went to the end, even if some components
    /// failed under `stop_on_error = false`; check `Execution::status`.
    #[instrument(skip(self), fields(pipeline = %self.name))]
    pub async fn execute(&self) -> Result<Execution, RunFailure> {
        let mut execution = Execution::start(&self.name, self.component_count());
        let mut ctx = StageContext::new(&self.name, &execution.execution_id);
        let deadline = self.policy.timeout_seconds.map(|seconds| Deadline {
            at: Instant::now() + Duration::from_secs(seconds),
            seconds,
        });

        info!(execution_id = %execution.execution_id, "🚀 Starting pipeline");

        let mut current = Dataset::default();
        let mut skip: Option<String> = None;
        let mut halt: Option<PipelineError> = None;

        for (name, step) in self.steps() {
            if let Some(reason) = &skip {
                let mut metrics = ComponentMetrics::new(name, step.role());
                metrics.fail(reason.clone());
                execution.record(metrics);
                continue;
            }

            let stage = match step {
                Step::Extract(e) => StageRef::Extract(e),
                Step::Transform(t) => StageRef::Transform(t, &current),
                Step::Load(l) => StageRef::Load(l, &current),
            };
            let (metrics, result) = self.run_component(name, stage, &mut ctx, deadline).await;
            execution.record(metrics);

            match result {
                Ok(StageOutput::Data(data)) => current = data,
                Ok(StageOutput::Loaded(_)) => {}
                Err(err) => {
                    if execution.error.is_none() {
                        execution.error = Some(err.to_string());
                    }
                    let timed_out = matches!(err, PipelineError::Timeout { .. });
                    if self.policy.stop_on_error {
                        halt = Some(err);
                        break;
                    }
                    if timed_out {
                        skip = Some("skipped: execution deadline exceeded".to_string());
                        halt = Some(err);
                    } else if step.role() != ComponentRole::Loader {
                        skip = Some(format!("skipped: upstream component '{name}' failed"));
                    }
                }
            }
        }

        if let (Some(quality), None, None) = (&self.quality, &halt, &skip) {
            match self
                .monitor(Arc::clone(quality), &execution.execution_id, current)
                .await
            {
                Ok(score) => execution.health_score = Some(score),
                Err(e) => warn!(error = %e, "Quality monitoring failed, execution result unaffected"),
            }
        }

        execution.finalize();
        self.persist(&execution).await;

        if execution.is_success() {
            info!(
                execution_id = %execution.execution_id,
                duration = execution.duration_seconds,
                records = execution.records_processed(),
                "✅ Pipeline completed"
            );
        } else {
            error!(
                execution_id = %execution.execution_id,
                failed = execution.failed_components,
                error = execution.error.as_deref().unwrap_or_default(),
                "❌ Pipeline failed"
            );
        }

        match halt {
            Some(error) => Err(RunFailure {
                execution: Box::new(execution),
                error,
            }),
            None => Ok(execution),
        }
    }

    /// Invokes one component with retries. Every failure is logged with the
    /// component name before it is returned.
    async fn run_component(
        &self,
        name: &str,
        stage: StageRef<'_>,
        ctx: &mut StageContext,
        deadline: Option<Deadline>,
    ) -> (ComponentMetrics, Result<StageOutput, PipelineError>) {
        let mut metrics = ComponentMetrics::new(name, stage.role());
        metrics.begin();
        let max_attempts = self.policy.max_retries.saturating_add(1);

        debug!(component = name, role = %stage.role(), "Running component");

        loop {
            metrics.attempts += 1;

            let attempt = match deadline {
                Some(d) => {
                    let timed = tokio::time::timeout_at(d.at, invoke(stage, ctx)).await;
                    let Ok(result) = timed else {
                        let err = PipelineError::Timeout {
                            component: name.to_string(),
                            seconds: d.seconds,
                        };
                        error!(component = name, error = %err, "Component failed");
                        metrics.warnings.extend(ctx.take_warnings());
                        metrics.fail(err.to_string());
                        return (metrics, Err(err));
                    };
                    result
                }
                None => invoke(stage, ctx).await,
            };
            metrics.warnings.extend(ctx.take_warnings());

            let cause: BoxError = match attempt {
                Ok(StageOutput::Loaded(true)) => {
                    let records = match stage {
                        StageRef::Load(_, data) => data.row_count(),
                        _ => 0,
                    };
                    metrics.complete(records);
                    return (metrics, Ok(StageOutput::Loaded(true)));
                }
                Ok(StageOutput::Data(mut data)) => {
                    let ragged = data.normalize();
                    if ragged > 0 {
                        warn!(component = name, rows = ragged, "Resized rows to the column count");
                        metrics
                            .warnings
                            .push(format!("{ragged} rows resized to {} columns", data.column_count()));
                    }
                    metrics.complete(data.row_count());
                    return (metrics, Ok(StageOutput::Data(data)));
                }
                Ok(StageOutput::Loaded(false)) => "loader reported an unsuccessful write".into(),
                Err(cause) => cause,
            };

            // Quality verdicts are deterministic; retrying cannot change them.
            let cause = match cause.downcast::<DataQualityError>() {
                Ok(dq) => {
                    let err = PipelineError::DataQuality(*dq);
                    error!(component = name, error = %err, "Component failed");
                    metrics.fail(err.to_string());
                    return (metrics, Err(err));
                }
                Err(other) => other,
            };

            if metrics.attempts < max_attempts {
                warn!(
                    component = name,
                    attempt = metrics.attempts,
                    error = %cause,
                    "Component attempt failed, retrying"
                );
                metrics.errors.push(format!("attempt {}: {}", metrics.attempts, cause));
                continue;
            }

            let err = stage.wrap(name, cause);
            error!(component = name, error = %err, "Component failed");
            metrics.fail(err.to_string());
            return (metrics, Err(err));
        }
    }

    async fn monitor(
        &self,
        quality: Arc<QualityStage>,
        execution_id: &str,
        data: Dataset,
    ) -> Result<f64, SluiceError> {
        let pipeline = self.name.clone();
        let execution_id = execution_id.to_string();
        tokio::task::spawn_blocking(move || {
            quality.monitor.analyze(
                &pipeline,
                Some(&quality.table),
                &data,
                quality.validator.as_ref(),
            )?;
            quality.monitor.health_score(&pipeline, Some(&execution_id))
        })
        .await
        .map_err(|e| SluiceError::InternalError(format!("quality task aborted: {e}")))?
    }

    /// Store and artifact writes. Failures are logged, never raised: the run
    /// outcome must not depend on bookkeeping.
    async fn persist(&self, execution: &Execution) {
        if self.store.is_none() && self.artifacts_dir.is_none() {
            return;
        }
        let store = self.store.clone();
        let dir = self.artifacts_dir.clone();
        let record = execution.clone();

        let joined = tokio::task::spawn_blocking(move || {
            if let Some(store) = store {
                if let Err(e) = store.insert_execution(&record) {
                    error!(execution_id = %record.execution_id, error = %e, "Failed to store execution");
                }
            }
            if let Some(dir) = dir {
                if let Err(e) = write_artifact(&dir, &record) {
                    error!(execution_id = %record.execution_id, error = %e, "Failed to write execution artifact");
                }
            }
        })
        .await;

        if let Err(e) = joined {
            error!(error = %e, "Execution persistence task aborted");
        }
    }
}

fn write_artifact(dir: &Path, execution: &Execution) -> Result<(), SluiceError> {
    let path = dir
        .join("executions")
        .join(format!("{}.json", execution.execution_id));
    let content = serde_json::to_string_pretty(execution)
        .map_err(InfrastructureError::from)?;
    atomic_write(&path, content)?;
    Ok(())
}

pub struct PipelineBuilder {
    name: String,
    extractors: Vec<Named<Box<dyn Extractor>>>,
    transformers: Vec<Named<Box<dyn Transformer>>>,
    loaders: Vec<Named<Box<dyn Loader>>>,
    policy: PipelinePolicy,
    store: Option<Arc<dyn QualityStore>>,
    quality: Option<QualityStage>,
    artifacts_dir: Option<PathBuf>,
}

impl PipelineBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extractors: Vec::new(),
            transformers: Vec::new(),
            loaders: Vec::new(),
            policy: PipelinePolicy::default(),
            store: None,
            quality: None,
            artifacts_dir: None,
        }
    }

    pub fn extractor(self, name: impl Into<String>, extractor: impl Extractor + 'static) -> Self {
        self.boxed_extractor(name, Box::new(extractor))
    }

    pub fn transformer(
        self,
        name: impl Into<String>,
        transformer: impl Transformer + 'static,
    ) -> Self {
        self.boxed_transformer(name, Box::new(transformer))
    }

    pub fn loader(self, name: impl Into<String>, loader: impl Loader + 'static) -> Self {
        self.boxed_loader(name, Box::new(loader))
    }

    pub fn boxed_extractor(mut self, name: impl Into<String>, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(Named {
            name: name.into(),
            component: extractor,
        });
        self
    }

    pub fn boxed_transformer(
        mut self,
        name: impl Into<String>,
        transformer: Box<dyn Transformer>,
    ) -> Self {
        self.transformers.push(Named {
            name: name.into(),
            component: transformer,
        });
        self
    }

    pub fn boxed_loader(mut self, name: impl Into<String>, loader: Box<dyn Loader>) -> Self {
        self.loaders.push(Named {
            name: name.into(),
            component: loader,
        });
        self
    }

    pub fn policy(mut self, policy: PipelinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(mut self, store: Arc<dyn QualityStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Analyzes the final dataset after the load stage and scores the run.
    /// Metrics are stored under `table_name`, or the pipeline name when unset.
    pub fn monitor(
        mut self,
        monitor: QualityMonitor,
        quality: &QualityConfig,
    ) -> Result<Self, DomainError> {
        let validator = if quality.rules.is_empty() {
            None
        } else {
            Some(QualityValidator::new(quality.rules.clone())?)
        };
        self.quality = Some(QualityStage {
            monitor,
            table: quality
                .table_name
                .clone()
                .unwrap_or_else(|| self.name.clone()),
            validator,
        });
        Ok(self)
    }

    pub fn artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    pub fn build(mut self) -> Result<Pipeline, DomainError> {
        if self.extractors.len() != 1 {
            return Err(DomainError::Configuration(format!(
                "Pipeline '{}' needs exactly one extractor, found {}",
                self.name,
                self.extractors.len()
            )));
        }
        if self.loaders.is_empty() {
            return Err(DomainError::Configuration(format!(
                "Pipeline '{}' needs at least one loader",
                self.name
            )));
        }
        let Some(extractor) = self.extractors.pop() else {
            return Err(DomainError::Configuration(format!(
                "Pipeline '{}' needs exactly one extractor, found 0",
                self.name
            )));
        };

        Ok(Pipeline {
            name: self.name,
            extractor,
            transformers: self.transformers,
            loaders: self.loaders,
            policy: self.policy,
            store: self.store,
            quality: self.quality.map(Arc::new),
            artifacts_dir: self.artifacts_dir,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::components::InlineExtractor;
    use crate::domain::dataset::Value;
    use crate::domain::pipeline::{ComponentStatus, ExecutionStatus};
    use crate::domain::quality::QualityThresholds;
    use crate::infrastructure::adapters::DuckDbStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    type Calls = Arc<Mutex<Vec<String>>>;

    fn sample() -> Dataset {
        Dataset::from_rows(
            vec!["id", "email"],
            vec![
                vec![Value::Int(1), Value::Text("a@example.com".into())],
                vec![Value::Int(2), Value::Text("b@example.com".into())],
            ],
        )
    }

    struct Recording {
        name: &'static str,
        calls: Calls,
        fail: bool,
    }

    fn recording(name: &'static str, calls: &Calls, fail: bool) -> Recording {
        Recording {
            name,
            calls: Arc::clone(calls),
            fail,
        }
    }

    impl Recording {
        fn hit(&self) -> Result<(), BoxError> {
            self.calls.lock().unwrap().push(self.name.to_string());
            if self.fail {
                Err(format!("{} exploded", self.name).into())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Extractor for Recording {
        async fn extract(&self, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
            self.hit().map(|_| sample())
        }
    }

    #[async_trait]
    impl Transformer for Recording {
        async fn transform(&self, data: &Dataset, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
            self.hit().map(|_| data.clone())
        }
    }

    #[async_trait]
    impl Loader for Recording {
        async fn load(&self, _data: &Dataset, _ctx: &mut StageContext) -> Result<bool, BoxError> {
            self.hit().map(|_| true)
        }
    }

    struct Flaky {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl Extractor for Flaky {
        async fn extract(&self, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err("transient".into());
            }
            Ok(sample())
        }
    }

    struct Refusing;

    #[async_trait]
    impl Loader for Refusing {
        async fn load(&self, _data: &Dataset, _ctx: &mut StageContext) -> Result<bool, BoxError> {
            Ok(false)
        }
    }

    struct Slow;

    #[async_trait]
    impl Extractor for Slow {
        async fn extract(&self, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(sample())
        }
    }

    struct Gate {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transformer for Gate {
        async fn transform(&self, _data: &Dataset, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Box::new(DataQualityError {
                component: "gate".into(),
                failed_rules: 1,
                messages: vec!["id_nn: 1 nulls".into()],
            }))
        }
    }

    fn lenient() -> PipelinePolicy {
        PipelinePolicy {
            stop_on_error: false,
            ..PipelinePolicy::default()
        }
    }

    #[tokio::test]
    async fn test_stop_on_error_halts_at_first_failure() {
        let calls = Calls::default();
        let pipeline = Pipeline::builder("halt")
            .extractor("src", recording("src", &calls, false))
            .transformer("t1", recording("t1", &calls, true))
            .transformer("t2", recording("t2", &calls, false))
            .loader("sink", recording("sink", &calls, false))
            .build()
            .unwrap();

        let failure = pipeline.execute().await.unwrap_err();
        assert_eq!(*calls.lock().unwrap(), vec!["src", "t1"]);
        assert_eq!(failure.execution.status, ExecutionStatus::Failed);
        assert_eq!(failure.execution.component_metrics.len(), 2);
        assert_eq!(failure.error.component(), "t1");
        assert!(matches!(failure.error, PipelineError::Transformation { .. }));
        assert!(failure.error.to_string().contains("t1 exploded"));
    }

    #[tokio::test]
    async fn test_continue_skips_downstream_and_counts_everything() {
        let calls = Calls::default();
        let pipeline = Pipeline::builder("lenient")
            .extractor("src", recording("src", &calls, false))
            .transformer("t1", recording("t1", &calls, true))
            .transformer("t2", recording("t2", &calls, false))
            .loader("sink", recording("sink", &calls, false))
            .policy(lenient())
            .build()
            .unwrap();

        let execution = pipeline.execute().await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["src", "t1"]);
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(
            execution.successful_components + execution.failed_components,
            execution.total_components
        );
        assert_eq!(execution.failed_components, 3);
        let skipped = &execution.component_metrics[2];
        assert_eq!(skipped.component_name, "t2");
        assert_eq!(skipped.errors, vec!["skipped: upstream component 't1' failed"]);
        assert_eq!(skipped.attempts, 0);
    }

    #[tokio::test]
    async fn test_failed_loader_does_not_block_siblings() {
        let calls = Calls::default();
        let pipeline = Pipeline::builder("fanout")
            .extractor("src", recording("src", &calls, false))
            .loader("broken", Refusing)
            .loader("sink", recording("sink", &calls, false))
            .policy(lenient())
            .build()
            .unwrap();

        let execution = pipeline.execute().await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["src", "sink"]);
        assert_eq!(execution.successful_components, 2);
        assert_eq!(execution.failed_components, 1);
        assert!(execution.error.as_deref().unwrap().contains("broken"));
        assert_eq!(execution.component_metrics[2].records_processed, 2);
    }

    #[tokio::test]
    async fn test_retries_keep_each_attempt_error() {
        let calls = Calls::default();
        let pipeline = Pipeline::builder("retry")
            .extractor(
                "flaky",
                Flaky {
                    failures_left: AtomicU32::new(1),
                },
            )
            .loader("sink", recording("sink", &calls, false))
            .policy(PipelinePolicy {
                max_retries: 2,
                ..PipelinePolicy::default()
            })
            .build()
            .unwrap();

        let execution = pipeline.execute().await.unwrap();
        assert!(execution.is_success());
        let extract = &execution.component_metrics[0];
        assert_eq!(extract.attempts, 2);
        assert_eq!(extract.status, ComponentStatus::Completed);
        assert_eq!(extract.errors, vec!["attempt 1: transient"]);
    }

    #[tokio::test]
    async fn test_data_quality_error_is_not_retried() {
        let calls = Calls::default();
        let pipeline = Pipeline::builder("strict")
            .extractor("src", recording("src", &calls, false))
            .transformer(
                "gate",
                Gate {
                    calls: AtomicU32::new(0),
                },
            )
            .loader("sink", recording("sink", &calls, false))
            .policy(PipelinePolicy {
                max_retries: 3,
                ..PipelinePolicy::default()
            })
            .build()
            .unwrap();

        let failure = pipeline.execute().await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::DataQuality(_)));
        assert_eq!(failure.execution.component_metrics[1].attempts, 1);
    }

    #[tokio::test]
    async fn test_deadline_aborts_even_when_lenient() {
        let calls = Calls::default();
        let pipeline = Pipeline::builder("slow")
            .extractor("slow", Slow)
            .loader("sink", recording("sink", &calls, false))
            .policy(PipelinePolicy {
                stop_on_error: false,
                timeout_seconds: Some(1),
                ..PipelinePolicy::default()
            })
            .build()
            .unwrap();

        let failure = pipeline.execute().await.unwrap_err();
        assert!(matches!(failure.error, PipelineError::Timeout { seconds: 1, .. }));
        assert!(calls.lock().unwrap().is_empty());
        let sink = &failure.execution.component_metrics[1];
        assert_eq!(sink.errors, vec!["skipped: execution deadline exceeded"]);
    }

    #[tokio::test]
    async fn test_shape_is_checked_at_build_time() {
        let calls = Calls::default();
        let err = Pipeline::builder("no_sink")
            .extractor("src", recording("src", &calls, false))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_execution_is_persisted_to_store_and_artifacts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn QualityStore> = Arc::new(DuckDbStore::in_memory()?);
        let calls = Calls::default();

        let pipeline = Pipeline::builder("persisted")
            .extractor("src", recording("src", &calls, false))
            .loader("sink", recording("sink", &calls, true))
            .store(Arc::clone(&store))
            .artifacts_dir(dir.path())
            .build()?;

        let failure = pipeline.execute().await.unwrap_err();
        assert_eq!(store.execution_count("persisted")?, 1);

        let artifact = dir
            .path()
            .join("executions")
            .join(format!("{}.json", failure.execution.execution_id));
        let stored: Execution = serde_json::from_str(&std::fs::read_to_string(artifact)?)?;
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(stored.component_metrics.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_quality_block_scores_the_run() -> anyhow::Result<()> {
        let store: Arc<dyn QualityStore> = Arc::new(DuckDbStore::in_memory()?);
        let monitor = QualityMonitor::new(Arc::clone(&store), QualityThresholds::default());
        let calls = Calls::default();

        let pipeline = Pipeline::builder("scored")
            .extractor("src", InlineExtractor::new(sample()))
            .loader("sink", recording("sink", &calls, false))
            .monitor(
                monitor,
                &QualityConfig {
                    table_name: Some("members".into()),
                    rules: vec![],
                },
            )?
            .build()?;

        let execution = pipeline.execute().await.unwrap();
        let score = execution.health_score.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
        Ok(())
    }

    struct Ragged;

    #[async_trait]
    impl Extractor for Ragged {
        async fn extract(&self, _ctx: &mut StageContext) -> Result<Dataset, BoxError> {
            let mut data = sample();
            data.rows.push(vec![Value::Int(3)]);
            Ok(data)
        }
    }

    struct Capture(Arc<Mutex<Option<Dataset>>>);

    #[async_trait]
    impl Loader for Capture {
        async fn load(&self, data: &Dataset, _ctx: &mut StageContext) -> Result<bool, BoxError> {
            *self.0.lock().unwrap() = Some(data.clone());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_ragged_extractor_output_is_resized() -> anyhow::Result<()> {
        let seen = Arc::new(Mutex::new(None));
        let pipeline = Pipeline::builder("ragged")
            .extractor("src", Ragged)
            .transformer("clean", crate::application::components::Cleaner::new(false, vec![])?)
            .loader("sink", Capture(Arc::clone(&seen)))
            .build()?;

        let execution = pipeline.execute().await.unwrap();
        assert!(execution.is_success());
        assert_eq!(execution.component_metrics[0].warnings, vec!["1 rows resized to 2 columns"]);

        let loaded = seen.lock().unwrap().take().unwrap();
        assert_eq!(loaded.row_count(), 3);
        assert_eq!(loaded.rows[2], vec![Value::Int(3), Value::Null]);
        Ok(())
    }

    #[tokio::test]
    async fn test_quality_table_defaults_to_pipeline_name() -> anyhow::Result<()> {
        let store: Arc<dyn QualityStore> = Arc::new(DuckDbStore::in_memory()?);
        let monitor = QualityMonitor::new(store, QualityThresholds::default());
        let calls = Calls::default();

        let pipeline = Pipeline::builder("members_sync")
            .extractor("src", InlineExtractor::new(sample()))
            .loader("sink", recording("sink", &calls, false))
            .monitor(monitor, &QualityConfig::default())?
            .build()?;

        assert_eq!(pipeline.quality.as_ref().unwrap().table, "members_sync");
        Ok(())
    }
}
