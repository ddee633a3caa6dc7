use super::context::{SequenceContext, StageContext};
use super::core::{Stage, StageList, StageRef};
use super::metadata::PipelineMetadata;
use crate::error::PeleeResult;
use crate::event::Event;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info};

/// Basic pipeline: a stage list driven by a context's `next` chain
///
/// `execute` resets the context, hands it the stage list when the context
/// supports stage assignment, and calls `next` once. Every later step is
/// driven by the stages themselves.
///
/// The context is per-run state. Concurrent `execute` calls on the same
/// pipeline are serialized; build one pipeline per worker to run in parallel.
///
/// # Example
/// ```
/// use pelee_lib::event::Event;
/// use pelee_lib::pipeline::{Pipeline, stages::RenameStage};
/// use serde_json::json;
///
/// let pipeline = Pipeline::builder("rename-pipeline")
///     .add_stage(RenameStage::single("a", "b"))
///     .build();
///
/// let mut event = Event::new(json!({"a": 1}));
/// pipeline.execute(&mut event)?;
/// assert_eq!(event.payload(), &json!({"b": 1}));
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
pub struct Pipeline {
    metadata: PipelineMetadata,
    stages: StageList,
    context: Mutex<Box<dyn StageContext>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("metadata", &self.metadata)
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn new(
        metadata: PipelineMetadata,
        stages: StageList,
        context: Box<dyn StageContext>,
    ) -> Self {
        Self {
            metadata,
            stages,
            context: Mutex::new(context),
        }
    }

    /// Get the pipeline name
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn metadata(&self) -> &PipelineMetadata {
        &self.metadata
    }

    /// Get the number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &StageList {
        &self.stages
    }

    /// Run the event through the pipeline
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::PeleeError::ExecutionStopped`] when a stage
    /// fails; the stop reason names the failure.
    pub fn execute(&self, event: &mut Event) -> PeleeResult<()> {
        let mut context = self.context.lock()?;

        info!(
            "Starting pipeline '{}' with {} stages (context: {})",
            self.name(),
            self.stages.len(),
            context.code()
        );
        let pipeline_start = Instant::now();

        context.reset();
        if let Some(assignable) = context.stage_assignment() {
            assignable.set_stages(self.stages.clone());
        }

        let result = context.next(event);
        let elapsed = pipeline_start.elapsed();

        match &result {
            Ok(()) => match context.stop_reason() {
                Some(reason) => info!(
                    "Pipeline '{}' stopped after {:.2}s: {}",
                    self.name(),
                    elapsed.as_secs_f64(),
                    reason
                ),
                None => info!(
                    "Pipeline '{}' completed in {:.2}s",
                    self.name(),
                    elapsed.as_secs_f64()
                ),
            },
            Err(e) => error!("Pipeline '{}' failed: {}", self.name(), e),
        }

        result
    }

    /// Read the context left behind by the last run
    ///
    /// Useful for output slots of a branching context and the stop reason.
    pub fn inspect_context<R>(&self, f: impl FnOnce(&dyn StageContext) -> R) -> PeleeResult<R> {
        let context = self.context.lock()?;
        Ok(f(&**context))
    }

    /// Mutably access the context between runs (for example to add branches)
    pub fn with_context<R>(&self, f: impl FnOnce(&mut dyn StageContext) -> R) -> PeleeResult<R> {
        let mut context = self.context.lock()?;
        Ok(f(&mut **context))
    }
}

/// Builder for constructing pipelines
pub struct PipelineBuilder {
    metadata: PipelineMetadata,
    stages: Vec<StageRef>,
    context: Option<Box<dyn StageContext>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: PipelineMetadata::new(name),
            stages: Vec::new(),
            context: None,
        }
    }

    pub fn metadata(mut self, metadata: PipelineMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_description(description);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata = self.metadata.with_property(key, value);
        self
    }

    /// Add a stage to the pipeline
    pub fn add_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Add a shared stage to the pipeline
    pub fn add_stage_ref(mut self, stage: StageRef) -> Self {
        self.stages.push(stage);
        self
    }

    /// Use a specific context variant (defaults to [`SequenceContext`])
    pub fn context(mut self, context: Box<dyn StageContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Pipeline {
        let context = self
            .context
            .unwrap_or_else(|| Box::new(SequenceContext::new()));
        Pipeline::new(self.metadata, self.stages.into(), context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeleeError;
    use crate::pipeline::branching::BranchingContext;
    use crate::pipeline::core::stage_list;
    use serde_json::json;

    // Test stage that records its name in the payload
    struct MarkStage {
        name: String,
    }

    impl MarkStage {
        fn new(name: impl Into<String>) -> Self {
            Self { name: name.into() }
        }
    }

    impl Stage for MarkStage {
        fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
            event.payload_mut()[&self.name] = json!("executed");
            context.next(event)
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    // Test stage that fails
    struct FailStage;

    impl Stage for FailStage {
        fn process(&self, _event: &mut Event, _context: &mut dyn StageContext) -> PeleeResult<()> {
            Err(PeleeError::processing("fail", "Stage failed"))
        }
    }

    #[test]
    fn test_pipeline_success() {
        let pipeline = Pipeline::builder("test-pipeline")
            .add_stage(MarkStage::new("stage1"))
            .add_stage(MarkStage::new("stage2"))
            .build();

        let mut event = Event::new(json!({}));
        pipeline.execute(&mut event).unwrap();

        assert_eq!(pipeline.stage_count(), 2);
        assert_eq!(
            event.payload(),
            &json!({"stage1": "executed", "stage2": "executed"})
        );
    }

    #[test]
    fn test_pipeline_failure() {
        let pipeline = Pipeline::builder("test-pipeline")
            .add_stage(MarkStage::new("stage1"))
            .add_stage(FailStage)
            .add_stage(MarkStage::new("stage3"))
            .build();

        let mut event = Event::new(json!({}));
        let err = pipeline.execute(&mut event).unwrap_err();

        assert!(err.is_stopped());
        assert!(event.payload().get("stage1").is_some());
        assert!(event.payload().get("stage3").is_none()); // Stage 3 never executed

        let reason = pipeline
            .inspect_context(|ctx| ctx.stop_reason().map(str::to_string))
            .unwrap();
        assert!(reason.unwrap().contains("Stage failed"));
    }

    #[test]
    fn test_pipeline_is_reusable_after_failure() {
        let pipeline = Pipeline::builder("test-pipeline")
            .add_stage(MarkStage::new("stage1"))
            .build();

        pipeline
            .with_context(|ctx| ctx.request_stop("left over"))
            .unwrap();

        let mut event = Event::new(json!({}));
        pipeline.execute(&mut event).unwrap();
        assert!(event.payload().get("stage1").is_some());
    }

    #[test]
    fn test_pipeline_with_branching_context() {
        let mut context = BranchingContext::new();
        context.add_branch("side", stage_list(vec![Arc::new(MarkStage::new("side")) as StageRef]));

        let pipeline = Pipeline::builder("branching")
            .add_stage(MarkStage::new("main"))
            .context(Box::new(context))
            .build();

        let mut event = Event::new(json!({}));
        pipeline.execute(&mut event).unwrap();

        assert_eq!(event.payload(), &json!({"main": "executed"}));
        let branches = pipeline
            .inspect_context(|ctx| {
                ctx.as_branching()
                    .map(|b| b.branch_names().iter().map(|s| s.to_string()).collect::<Vec<_>>())
            })
            .unwrap()
            .unwrap();
        assert_eq!(branches, vec!["default", "side"]);
    }
}
