use super::context::{EnhancedContext, StageInfo};
use super::pool::{join_blocking, WorkerPool, DEFAULT_WORKERS};
use super::stage::{EnhancedStage, StageAdapter, StageHealth};
use super::strategy::{AllStages, ExecutionStrategy, FirstResult, ResultMerge, StagePolicy};
use crate::error::{PeleeError, PeleeResult};
use crate::event::Event;
use crate::pipeline::{PipelineMetadata, StageRef};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type EnhancedStageRef = Arc<dyn EnhancedStage>;

/// Outcome of one enhanced run
///
/// Holds either the result event or the error, plus the run's metric map as
/// it stood after cleanup.
#[derive(Debug)]
pub struct ExecutionResult {
    pipeline_id: String,
    execution_id: Uuid,
    success: bool,
    event: Option<Event>,
    error: Option<PeleeError>,
    end_time: DateTime<Utc>,
    duration: Duration,
    metrics: HashMap<String, Value>,
}

impl ExecutionResult {
    fn new(
        context: &EnhancedContext,
        outcome: PeleeResult<Event>,
        duration: Duration,
    ) -> Self {
        let (success, event, error) = match outcome {
            Ok(event) => (true, Some(event), None),
            Err(err) => (false, None, Some(err)),
        };
        Self {
            pipeline_id: context.pipeline_id().to_string(),
            execution_id: context.execution_id(),
            success,
            event,
            error,
            end_time: Utc::now(),
            duration,
            metrics: context.metrics_snapshot(),
        }
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    pub fn error(&self) -> Option<&PeleeError> {
        self.error.as_ref()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn metrics(&self) -> &HashMap<String, Value> {
        &self.metrics
    }

    pub fn metric(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    /// The result event, or the error that ended the run
    pub fn into_result(self) -> PeleeResult<Event> {
        match (self.event, self.error) {
            (Some(event), _) => Ok(event),
            (None, Some(err)) => Err(err),
            (None, None) => Err(PeleeError::GenericError(format!(
                "Pipeline '{}' produced no result",
                self.pipeline_id
            ))),
        }
    }
}

/// Multi-strategy pipeline with the full stage lifecycle
///
/// Call [`initialize`](Self::initialize) once, then [`execute`](Self::execute)
/// any number of times. Each run gets a fresh [`EnhancedContext`]; stages are
/// shared between runs and, under [`ExecutionStrategy::Parallel`], between
/// threads.
///
/// # Example
/// ```
/// use pelee_lib::enhanced::{EnhancedPipeline, ExecutionStrategy};
/// use pelee_lib::event::Event;
/// use pelee_lib::pipeline::stages::RenameStage;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let pipeline = EnhancedPipeline::builder("orders")
///     .strategy(ExecutionStrategy::Batch)
///     .add_basic_stage(Arc::new(RenameStage::single("id", "order_id")))
///     .build();
/// pipeline.initialize()?;
///
/// let result = pipeline.execute(Event::new(json!([{"id": 1}, {"id": 2}])));
/// assert!(result.is_success());
/// assert_eq!(
///     result.event().unwrap().payload(),
///     &json!([{"order_id": 1}, {"order_id": 2}])
/// );
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
pub struct EnhancedPipeline {
    metadata: PipelineMetadata,
    stages: Arc<[EnhancedStageRef]>,
    strategy: ExecutionStrategy,
    policy: Arc<dyn StagePolicy>,
    merge: Arc<dyn ResultMerge>,
    configuration: Value,
    pool: WorkerPool,
    initialized: Mutex<bool>,
}

impl EnhancedPipeline {
    /// Create a new pipeline builder
    pub fn builder(id: impl Into<String>) -> EnhancedPipelineBuilder {
        EnhancedPipelineBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata(&self) -> &PipelineMetadata {
        &self.metadata
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Health of every stage, in list order
    pub fn health(&self) -> Vec<(String, StageHealth)> {
        self.stages
            .iter()
            .map(|s| (s.name().to_string(), s.health()))
            .collect()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.lock().map(|flag| *flag).unwrap_or(false)
    }

    /// Fresh per-run context seeded with the pipeline's properties
    pub fn new_context(&self) -> EnhancedContext {
        EnhancedContext::with_properties(self.id(), self.metadata.properties().clone())
    }

    /// Initialize every stage once; later calls are no-ops
    ///
    /// # Errors
    ///
    /// Returns [`PeleeError::Initialization`] naming the first stage that
    /// failed. Stages initialized before it are cleaned up and the pipeline
    /// stays uninitialized.
    pub fn initialize(&self) -> PeleeResult<()> {
        let mut initialized = self.initialized.lock()?;
        if *initialized {
            return Ok(());
        }

        let context = self.new_context();
        for (index, stage) in self.stages.iter().enumerate() {
            if let Err(err) = stage.initialize(&self.configuration, &context) {
                error!(
                    "Stage '{}' failed to initialize in pipeline '{}': {}",
                    stage.name(),
                    self.id(),
                    err
                );
                self.cleanup_stages(&self.stages[..index], &context);
                return Err(match err {
                    e @ PeleeError::Initialization { .. } => e,
                    e => PeleeError::Initialization {
                        stage: stage.name().to_string(),
                        message: e.to_string(),
                    },
                });
            }
        }

        *initialized = true;
        info!(
            "Pipeline '{}' initialized with {} stages (strategy: {})",
            self.id(),
            self.stages.len(),
            self.strategy
        );
        Ok(())
    }

    /// Run one event with a fresh context
    pub fn execute(&self, event: Event) -> ExecutionResult {
        let context = Arc::new(self.new_context());
        self.execute_in(event, &context)
    }

    /// Run one event with a caller-supplied context
    ///
    /// Keeping a clone of the `Arc` lets another thread request a stop while
    /// the run is in flight.
    pub fn execute_in(&self, event: Event, context: &Arc<EnhancedContext>) -> ExecutionResult {
        let pipeline_start = Instant::now();

        if !self.is_initialized() {
            warn!("Pipeline '{}' executed before initialization", self.id());
            let err = PeleeError::NotInitialized(self.id().to_string());
            context.record_metric("error", json!(err.to_string()));
            return ExecutionResult::new(context, Err(err), pipeline_start.elapsed());
        }

        info!(
            "Starting pipeline '{}' with {} stages (strategy: {}, execution: {})",
            self.id(),
            self.stages.len(),
            self.strategy,
            context.execution_id()
        );
        context.record_metric("start_time", json!(context.start_time().to_rfc3339()));
        context.record_metric("execution_type", json!(self.strategy.as_str()));

        let outcome = match self.strategy {
            ExecutionStrategy::Sequential => {
                let stages: Vec<_> = self.stages.iter().enumerate().collect();
                self.run_sequential(event, &stages, context)
            }
            ExecutionStrategy::Conditional => {
                let stages: Vec<_> = self
                    .stages
                    .iter()
                    .enumerate()
                    .filter(|&(index, stage)| {
                        self.policy.is_enabled(index, &**stage, &event, context)
                    })
                    .collect();
                context.record_metric("enabled_stages", json!(stages.len()));
                self.run_sequential(event, &stages, context)
            }
            ExecutionStrategy::Parallel => self.run_parallel(event, context),
            ExecutionStrategy::Batch => self.run_batch(event, context),
        };

        if let Some(reason) = context.stop_reason() {
            context.record_metric("stop_reason", json!(reason));
        }
        if let Err(err) = &outcome {
            context.record_metric("error", json!(err.to_string()));
        }

        self.cleanup_stages(&self.stages, context);

        let duration = pipeline_start.elapsed();
        context.record_metric("duration_ms", json!(duration.as_millis() as u64));

        match &outcome {
            Ok(_) => info!(
                "Pipeline '{}' completed successfully in {:.2}s (execution: {})",
                self.id(),
                duration.as_secs_f64(),
                context.execution_id()
            ),
            Err(err) => error!(
                "Pipeline '{}' failed after {:.2}s (execution: {}): {}",
                self.id(),
                duration.as_secs_f64(),
                context.execution_id(),
                err
            ),
        }

        ExecutionResult::new(context, outcome, duration)
    }

    /// Run [`execute`](Self::execute) on the caller's tokio blocking pool
    pub async fn execute_async(self: Arc<Self>, event: Event) -> PeleeResult<ExecutionResult> {
        tokio::task::spawn_blocking(move || self.execute(event))
            .await
            .map_err(|e| PeleeError::WorkerPool(format!("Execution task failed: {}", e)))
    }

    /// Clean up every stage and release the worker pool
    ///
    /// The pipeline must be initialized again before the next run, and
    /// parallel runs are no longer possible.
    pub fn shutdown(&self) {
        if let Ok(mut initialized) = self.initialized.lock() {
            if *initialized {
                let context = self.new_context();
                self.cleanup_stages(&self.stages, &context);
                *initialized = false;
            }
        }
        self.pool.shutdown();
        info!("Pipeline '{}' shut down", self.id());
    }

    fn run_sequential(
        &self,
        mut event: Event,
        stages: &[(usize, &EnhancedStageRef)],
        context: &EnhancedContext,
    ) -> PeleeResult<Event> {
        for &(index, stage) in stages {
            if context.should_stop() {
                info!(
                    "Pipeline '{}' stopping before stage '{}': {}",
                    self.id(),
                    stage.name(),
                    context.stop_reason().unwrap_or("stop requested")
                );
                break;
            }
            run_stage(index, self.stages.len(), &**stage, &mut event, context)?;
        }
        Ok(event)
    }

    fn run_parallel(&self, event: Event, context: &Arc<EnhancedContext>) -> PeleeResult<Event> {
        let handle = self.pool.handle()?;
        let total = self.stages.len();
        let mut handles = Vec::with_capacity(total);

        for (index, stage) in self.stages.iter().enumerate() {
            if context.should_stop() {
                info!(
                    "Pipeline '{}' stop requested, {} of {} stages dispatched",
                    self.id(),
                    index,
                    total
                );
                break;
            }
            let stage = stage.clone();
            let context = context.clone();
            let mut branch = event.clone();
            handles.push(handle.spawn_blocking(move || {
                run_stage(index, total, stage.as_ref(), &mut branch, &context).map(|()| branch)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for result in join_blocking(handles) {
            match result {
                Ok(branch) => results.push(branch),
                Err(err) => {
                    context.increment_metric("parallel_failures", 1);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        self.merge.merge(&event, results)
    }

    fn run_batch(&self, event: Event, context: &EnhancedContext) -> PeleeResult<Event> {
        let elements = match event.payload() {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        context.record_metric("batch_size", json!(elements.len()));

        let total = self.stages.len();
        let mut outputs = Vec::with_capacity(elements.len());
        let mut rejected = 0u64;

        'elements: for (position, item) in elements.into_iter().enumerate() {
            if context.should_stop() {
                info!(
                    "Pipeline '{}' stopping batch at element {}: {}",
                    self.id(),
                    position,
                    context.stop_reason().unwrap_or("stop requested")
                );
                break;
            }

            let mut element = Event::with_metadata_map(item, event.metadata_map().clone());
            element.set_metadata("batch_index", json!(position));

            for (index, stage) in self.stages.iter().enumerate() {
                match run_stage(index, total, stage.as_ref(), &mut element, context) {
                    Ok(()) => {}
                    Err(err @ PeleeError::Validation { .. }) => {
                        warn!("Dropping batch element {}: {}", position, err);
                        rejected += 1;
                        continue 'elements;
                    }
                    Err(err) => return Err(err),
                }
            }
            outputs.push(element.into_payload());
        }

        for stage in self.stages.iter() {
            stage.flush(context).map_err(|err| {
                context.record_metric("failed_stage", json!(stage.name()));
                match err {
                    e @ PeleeError::Flush { .. } => e,
                    e => PeleeError::Flush {
                        stage: stage.name().to_string(),
                        message: e.to_string(),
                    },
                }
            })?;
        }

        context.record_metric("batch_results", json!(outputs.len()));
        context.record_metric("validation_failures", json!(rejected));
        Ok(event.with_payload(Value::Array(outputs)))
    }

    /// Best-effort cleanup; failures become `cleanup_error.<stage>` metrics
    fn cleanup_stages(&self, stages: &[EnhancedStageRef], context: &EnhancedContext) {
        for stage in stages {
            if let Err(err) = stage.cleanup(context) {
                warn!(
                    "Stage '{}' cleanup failed in pipeline '{}': {}",
                    stage.name(),
                    self.id(),
                    err
                );
                context.record_metric(
                    format!("cleanup_error.{}", stage.name()),
                    json!(err.to_string()),
                );
            }
        }
    }
}

/// Validate then process one stage, turning failures into a stopped run
fn run_stage(
    index: usize,
    total: usize,
    stage: &dyn EnhancedStage,
    event: &mut Event,
    context: &EnhancedContext,
) -> PeleeResult<()> {
    let name = stage.name();
    context.set_current_stage(StageInfo::new(name, index));
    debug!("Executing stage {}/{}: {}", index + 1, total, name);
    let stage_start = Instant::now();

    if let Err(err) = stage.validate(event, context) {
        context.record_metric("failed_stage", json!(name));
        return Err(match err {
            e @ PeleeError::Validation { .. } => e,
            e => PeleeError::validation(name, e.to_string()),
        });
    }

    match stage.process_enhanced(event, context) {
        Ok(()) => {
            debug!(
                "Stage '{}' completed successfully in {:.2}s",
                name,
                stage_start.elapsed().as_secs_f64()
            );
            Ok(())
        }
        Err(err) if err.is_stopped() => {
            context.record_metric("failed_stage", json!(name));
            Err(err)
        }
        Err(err) => {
            context.record_metric("failed_stage", json!(name));
            let reason = format!("Stage processing failed: {}", err);
            context.request_stop(&reason);
            Err(PeleeError::ExecutionStopped {
                reason,
                source: Box::new(err),
            })
        }
    }
}

/// Builder for constructing enhanced pipelines
pub struct EnhancedPipelineBuilder {
    metadata: PipelineMetadata,
    stages: Vec<EnhancedStageRef>,
    strategy: ExecutionStrategy,
    policy: Arc<dyn StagePolicy>,
    merge: Arc<dyn ResultMerge>,
    configuration: Value,
    workers: usize,
}

impl EnhancedPipelineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            metadata: PipelineMetadata::new(id),
            stages: Vec::new(),
            strategy: ExecutionStrategy::default(),
            policy: Arc::new(AllStages),
            merge: Arc::new(FirstResult),
            configuration: Value::Object(Default::default()),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Replace the metadata; its name becomes the pipeline id
    pub fn metadata(mut self, metadata: PipelineMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn add_stage<S: EnhancedStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn add_stage_ref(mut self, stage: EnhancedStageRef) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a chained stage through a [`StageAdapter`]
    pub fn add_basic_stage(mut self, stage: StageRef) -> Self {
        self.stages.push(Arc::new(StageAdapter::new(stage)));
        self
    }

    /// Stage selection for [`ExecutionStrategy::Conditional`]
    pub fn policy<P: StagePolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Result combination for [`ExecutionStrategy::Parallel`]
    pub fn merge<M: ResultMerge + 'static>(mut self, merge: M) -> Self {
        self.merge = Arc::new(merge);
        self
    }

    /// Block handed to every stage's `initialize`
    pub fn configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Upper bound on concurrently running parallel stages
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn build(self) -> EnhancedPipeline {
        EnhancedPipeline {
            metadata: self.metadata,
            stages: self.stages.into(),
            strategy: self.strategy,
            policy: self.policy,
            merge: self.merge,
            configuration: self.configuration,
            pool: WorkerPool::new(self.workers),
            initialized: Mutex::new(false),
        }
    }
}
