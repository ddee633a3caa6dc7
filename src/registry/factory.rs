use super::contexts::ContextRegistry;
use super::descriptor::{parse_config, stage_type_of};
use super::filters::FilterRegistry;
use super::stages::StageRegistry;
use crate::enhanced::{EnhancedPipeline, ExecutionStrategy, NamedStages, DEFAULT_WORKERS};
use crate::error::{PeleeError, PeleeResult};
use crate::pipeline::stages::{route, RouteConfig, RouteStage};
use crate::pipeline::{
    stage_list, BranchingContext, DataPipeline, DataPipelineBuilder, FilterChain, Pipeline,
    PipelineMetadata, SequenceContext,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// JSON pipeline definition
///
/// # Example
/// ```json
/// {
///   "name": "dialog-cleanup",
///   "context": "branching",
///   "processors": [{"type": "route", "field": "/kind", "routes": {"err": "errors"}}],
///   "branches": {"errors": [{"type": "output", "name": "errors"}]}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Context code for basic pipelines, strategy for enhanced ones
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, alias = "_processors")]
    pub processors: Vec<Value>,
    #[serde(default)]
    pub branches: HashMap<String, Vec<Value>>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    /// Handed to every enhanced stage's `initialize`
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub enabled_stages: Option<Vec<String>>,
    /// Filter nodes for data pipelines
    #[serde(default)]
    pub filters: Vec<Value>,
}

fn default_version() -> String {
    crate::pipeline::metadata::DEFAULT_VERSION.to_string()
}

impl PipelineDefinition {
    pub fn from_json(json: &str) -> PeleeResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PeleeError::ConfigError(format!("Invalid pipeline definition: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> PeleeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| {
            PeleeError::ConfigError(format!("{}: {}", path.display(), e))
        })
    }

    pub fn metadata(&self) -> PipelineMetadata {
        PipelineMetadata::new(&self.name)
            .with_description(&self.description)
            .with_version(&self.version)
            .with_properties(self.properties.clone())
    }
}

/// What [`PipelineFactory::check`] assembled
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblySummary {
    pub name: String,
    pub stages: usize,
    pub filters: usize,
    /// Set when the definition was assembled for the enhanced engine
    pub strategy: Option<ExecutionStrategy>,
}

impl std::fmt::Display for AssemblySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pipeline '{}' is valid ({} stages", self.name, self.stages)?;
        if let Some(strategy) = self.strategy {
            write!(f, ", strategy: {}", strategy)?;
        }
        write!(f, ", {} filters)", self.filters)
    }
}

/// Assembles pipelines from definitions using the stage and context registries
///
/// # Example
/// ```
/// use pelee_lib::event::Event;
/// use pelee_lib::registry::{PipelineDefinition, PipelineFactory};
/// use serde_json::json;
///
/// let factory = PipelineFactory::with_builtins()?;
/// let definition = PipelineDefinition::from_json(
///     r#"{"name": "demo", "processors": [{"type": "rename", "mappings": {"a": "b"}}]}"#,
/// )?;
///
/// let pipeline = factory.create_pipeline(&definition)?;
/// let mut event = Event::new(json!({"a": 1}));
/// pipeline.execute(&mut event)?;
/// assert_eq!(event.payload(), &json!({"b": 1}));
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
pub struct PipelineFactory {
    stages: Arc<StageRegistry>,
    contexts: ContextRegistry,
    filters: Arc<FilterRegistry>,
    workers: usize,
}

impl PipelineFactory {
    /// Factory without filter types; add them with [`Self::with_filter_registry`]
    pub fn new(stages: Arc<StageRegistry>, contexts: ContextRegistry) -> Self {
        Self {
            stages,
            contexts,
            filters: Arc::new(FilterRegistry::new()),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Factory over the built-in stages, filters and contexts
    pub fn with_builtins() -> PeleeResult<Self> {
        Ok(Self::new(
            Arc::new(StageRegistry::with_builtin_stages()?),
            ContextRegistry::new(),
        )
        .with_filter_registry(Arc::new(FilterRegistry::with_builtin_filters()?)))
    }

    pub fn with_filter_registry(mut self, filters: Arc<FilterRegistry>) -> Self {
        self.filters = filters;
        self
    }

    /// Worker count for enhanced pipelines using the parallel strategy
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Assemble everything a definition describes without running it
    ///
    /// With `enhanced` the stages are assembled for [`EnhancedPipeline`],
    /// otherwise for the chained [`Pipeline`]. Filters are always built.
    pub fn check(
        &self,
        definition: &PipelineDefinition,
        enhanced: bool,
    ) -> PeleeResult<AssemblySummary> {
        let filters = self.create_filter_chain(definition)?.len();
        let (stages, strategy) = if enhanced {
            let pipeline = self.create_enhanced(definition)?;
            (pipeline.stage_count(), Some(pipeline.strategy()))
        } else {
            (self.create_pipeline(definition)?.stage_count(), None)
        };
        Ok(AssemblySummary {
            name: definition.name.clone(),
            stages,
            filters,
            strategy,
        })
    }

    /// Build the definition's `filters` into a chain
    pub fn create_filter_chain(&self, definition: &PipelineDefinition) -> PeleeResult<FilterChain> {
        self.filters.create_chain(&definition.filters)
    }

    /// Start a data pipeline around the definition's filter chain
    ///
    /// Sources and sinks are runtime objects, so the caller adds them to the
    /// returned builder.
    pub fn create_data_pipeline(
        &self,
        definition: &PipelineDefinition,
    ) -> PeleeResult<DataPipelineBuilder> {
        let chain = self.create_filter_chain(definition)?;
        info!(
            "Assembled data pipeline '{}' with {} filters",
            definition.name,
            chain.len()
        );
        Ok(DataPipeline::builder(&definition.name)
            .metadata(definition.metadata())
            .filter_chain(chain))
    }

    /// Build a basic chained pipeline
    ///
    /// # Errors
    ///
    /// Fails on unknown stage or context codes, invalid stage configuration,
    /// on `branches` when the context cannot hold branches, and on route
    /// stages whose targets are missing or point back at their own branch.
    pub fn create_pipeline(&self, definition: &PipelineDefinition) -> PeleeResult<Pipeline> {
        let code = definition
            .context
            .as_deref()
            .unwrap_or(SequenceContext::CODE);
        let mut context = self.contexts.create(code)?;
        let stages = self.stages.create_all(&definition.processors)?;

        if !definition.branches.is_empty() {
            let branching = context.branching().ok_or_else(|| {
                PeleeError::ConfigError(format!(
                    "Pipeline '{}' defines branches but context '{}' does not support them",
                    definition.name, code
                ))
            })?;
            for (name, nodes) in &definition.branches {
                let branch = self.stages.create_all(nodes)?;
                debug!(branch = %name, stages = branch.len(), "Adding branch");
                branching.add_branch(name, stage_list(branch));
            }
        }
        if context.branching().is_some() {
            check_routes(definition)?;
        }

        info!(
            "Assembled pipeline '{}' with {} stages (context: {})",
            definition.name,
            stages.len(),
            code
        );

        let mut builder = Pipeline::builder(&definition.name)
            .metadata(definition.metadata())
            .context(context);
        for stage in stages {
            builder = builder.add_stage_ref(stage);
        }
        Ok(builder.build())
    }

    /// Build an enhanced pipeline; the stages are wrapped in adapters
    ///
    /// The pipeline still has to be initialized before it runs.
    pub fn create_enhanced(&self, definition: &PipelineDefinition) -> PeleeResult<EnhancedPipeline> {
        let strategy = match definition.context.as_deref() {
            Some(code) => code.parse::<ExecutionStrategy>()?,
            None => ExecutionStrategy::default(),
        };
        if !definition.branches.is_empty() {
            return Err(PeleeError::ConfigError(format!(
                "Pipeline '{}' defines branches, which enhanced pipelines do not support",
                definition.name
            )));
        }

        let stages = self.stages.create_all(&definition.processors)?;

        let mut builder = EnhancedPipeline::builder(&definition.name)
            .metadata(definition.metadata())
            .strategy(strategy)
            .configuration(definition.configuration.clone())
            .workers(self.workers);
        if let Some(names) = &definition.enabled_stages {
            builder = builder.policy(NamedStages::new(names.iter().cloned()));
        }
        for stage in stages {
            builder = builder.add_basic_stage(stage);
        }

        info!(
            "Assembled enhanced pipeline '{}' with {} stages (strategy: {})",
            definition.name,
            definition.processors.len(),
            strategy
        );
        Ok(builder.build())
    }
}

/// Every route target must name another registered branch
fn check_routes(definition: &PipelineDefinition) -> PeleeResult<()> {
    let branches = std::iter::once((BranchingContext::DEFAULT_BRANCH, &definition.processors))
        .chain(definition.branches.iter().map(|(name, nodes)| (name.as_str(), nodes)));
    let known = |target: &str| {
        target == BranchingContext::DEFAULT_BRANCH || definition.branches.contains_key(target)
    };

    for (branch, nodes) in branches {
        for node in nodes {
            if stage_type_of(node)? != route::TYPE_CODE {
                continue;
            }
            let stage = RouteStage::new(parse_config::<RouteConfig>(route::TYPE_CODE, node)?);
            for target in stage.targets() {
                if target == branch {
                    return Err(PeleeError::ConfigError(format!(
                        "Pipeline '{}': route in branch '{}' targets its own branch",
                        definition.name, branch
                    )));
                }
                if !known(target) {
                    return Err(PeleeError::ConfigError(format!(
                        "Pipeline '{}': route in branch '{}' targets unknown branch '{}'",
                        definition.name, branch, target
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use serde_json::json;

    fn factory() -> PipelineFactory {
        PipelineFactory::with_builtins().unwrap()
    }

    #[test]
    fn test_definition_defaults_and_alias() {
        let definition = PipelineDefinition::from_json(
            r#"{"name": "p", "_processors": [{"code": "print"}]}"#,
        )
        .unwrap();
        assert_eq!(definition.version, "1.0");
        assert_eq!(definition.processors.len(), 1);
        assert!(definition.context.is_none());
        assert!(definition.enabled_stages.is_none());
    }

    #[test]
    fn test_invalid_definition_is_config_error() {
        let err = PipelineDefinition::from_json(r#"{"processors": []}"#).unwrap_err();
        assert!(matches!(err, PeleeError::ConfigError(_)));
    }

    #[test]
    fn test_create_pipeline_with_metadata() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "meta",
                "description": "renames",
                "properties": {"owner": "ops"},
                "processors": [{"type": "rename", "mappings": {"x": "y"}}]
            }"#,
        )
        .unwrap();
        let pipeline = factory().create_pipeline(&definition).unwrap();

        assert_eq!(pipeline.name(), "meta");
        assert_eq!(pipeline.metadata().description(), "renames");
        assert_eq!(pipeline.metadata().property("owner"), Some(&json!("ops")));
        assert_eq!(pipeline.stage_count(), 1);
    }

    #[test]
    fn test_unknown_stage_and_context() {
        let bad_stage =
            PipelineDefinition::from_json(r#"{"name": "p", "processors": [{"type": "nope"}]}"#)
                .unwrap();
        assert!(matches!(
            factory().create_pipeline(&bad_stage),
            Err(PeleeError::UnknownStageType(code)) if code == "nope"
        ));

        let bad_context =
            PipelineDefinition::from_json(r#"{"name": "p", "context": "spiral"}"#).unwrap();
        assert!(matches!(
            factory().create_pipeline(&bad_context),
            Err(PeleeError::UnknownContextType(_))
        ));
    }

    #[test]
    fn test_branches_need_branching_context() {
        let definition = PipelineDefinition::from_json(
            r#"{"name": "p", "branches": {"errors": [{"type": "print"}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            factory().create_pipeline(&definition),
            Err(PeleeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_branching_pipeline_routes_to_output() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "router",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "routes": {"err": "errors"}}],
                "branches": {"errors": [{"type": "output", "name": "failed"}]}
            }"#,
        )
        .unwrap();
        let pipeline = factory().create_pipeline(&definition).unwrap();

        let mut event = Event::new(json!({"kind": "err"}));
        pipeline.execute(&mut event).unwrap();

        let routed = pipeline
            .inspect_context(|context| {
                context
                    .as_branching()
                    .and_then(|branching| branching.output("failed"))
                    .cloned()
            })
            .unwrap();
        assert_eq!(routed.map(|e| e.into_payload()), Some(json!({"kind": "err"})));
    }

    #[test]
    fn test_route_to_own_branch_is_rejected() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "loop",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "routes": {"err": "errors"}}],
                "branches": {
                    "errors": [{"type": "route", "field": "/kind", "default": "errors"}]
                }
            }"#,
        )
        .unwrap();
        let err = factory().create_pipeline(&definition).unwrap_err();
        assert!(matches!(err, PeleeError::ConfigError(ref msg) if msg.contains("own branch")));

        let main_loop = PipelineDefinition::from_json(
            r#"{
                "name": "loop",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "default": "default"}]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            factory().create_pipeline(&main_loop),
            Err(PeleeError::ConfigError(_))
        ));
    }

    #[test]
    fn test_route_to_unknown_branch_is_rejected() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "lost",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "routes": {"err": "nowhere"}}]
            }"#,
        )
        .unwrap();
        let err = factory().create_pipeline(&definition).unwrap_err();
        assert!(matches!(err, PeleeError::ConfigError(ref msg) if msg.contains("nowhere")));
    }

    #[test]
    fn test_route_back_to_default_is_accepted() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "retry",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "routes": {"err": "errors"}}],
                "branches": {
                    "errors": [{"type": "route", "field": "/retry", "routes": {"true": "default"}}]
                }
            }"#,
        )
        .unwrap();
        assert!(factory().create_pipeline(&definition).is_ok());
    }

    #[test]
    fn test_route_cycle_between_branches_fails_at_run_time() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "cycle",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "default": "ping"}],
                "branches": {
                    "ping": [{"type": "route", "field": "/kind", "default": "pong"}],
                    "pong": [{"type": "route", "field": "/kind", "default": "ping"}]
                }
            }"#,
        )
        .unwrap();
        let pipeline = factory().create_pipeline(&definition).unwrap();

        let err = pipeline.execute(&mut Event::new(json!({}))).unwrap_err();

        assert!(matches!(
            err.root_cause(),
            PeleeError::BranchLimitExceeded { .. }
        ));
    }

    #[test]
    fn test_create_enhanced_with_strategy_and_policy() {
        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "cond",
                "context": "CONDITIONAL",
                "enabled_stages": ["remove"],
                "processors": [
                    {"type": "rename", "mappings": {"a": "b"}},
                    {"type": "remove", "fields": ["c"]}
                ]
            }"#,
        )
        .unwrap();
        let pipeline = factory().create_enhanced(&definition).unwrap();
        assert_eq!(pipeline.strategy(), ExecutionStrategy::Conditional);
        pipeline.initialize().unwrap();

        let result = pipeline.execute(Event::new(json!({"a": 1, "c": 2})));

        assert_eq!(result.event().unwrap().payload(), &json!({"a": 1}));
    }

    #[test]
    fn test_check_follows_the_chosen_engine() {
        let branching = PipelineDefinition::from_json(
            r#"{
                "name": "router",
                "context": "branching",
                "processors": [{"type": "route", "field": "/kind", "routes": {"err": "errors"}}],
                "branches": {"errors": [{"type": "print"}]},
                "filters": [{"type": "remove", "fields": ["x"]}]
            }"#,
        )
        .unwrap();
        let summary = factory().check(&branching, false).unwrap();
        assert_eq!(summary.stages, 1);
        assert_eq!(summary.filters, 1);
        assert_eq!(summary.strategy, None);
        assert_eq!(
            summary.to_string(),
            "Pipeline 'router' is valid (1 stages, 1 filters)"
        );
        // "branching" is a chained context code, not an enhanced strategy
        assert!(matches!(
            factory().check(&branching, true),
            Err(PeleeError::UnknownContextType(_))
        ));

        let parallel = PipelineDefinition::from_json(
            r#"{"name": "fan", "context": "PARALLEL", "processors": [{"type": "print"}, {"type": "print"}]}"#,
        )
        .unwrap();
        let summary = factory().check(&parallel, true).unwrap();
        assert_eq!(summary.strategy, Some(ExecutionStrategy::Parallel));
        assert_eq!(summary.stages, 2);
        assert!(summary.to_string().contains("strategy: "));
        // PARALLEL is not a chained context code
        assert!(matches!(
            factory().check(&parallel, false),
            Err(PeleeError::UnknownContextType(_))
        ));
    }

    #[test]
    fn test_create_data_pipeline_from_filters() {
        use crate::pipeline::{MemorySink, VecSource};

        let definition = PipelineDefinition::from_json(
            r#"{
                "name": "scrub",
                "filters": [
                    {"type": "rename", "mappings": {"pw": "password"}},
                    {"type": "remove", "fields": ["password"]}
                ]
            }"#,
        )
        .unwrap();
        let sink = MemorySink::new();
        let pipeline = factory()
            .create_data_pipeline(&definition)
            .unwrap()
            .source(VecSource::new([Event::new(json!({"user": "ada", "pw": "x"}))]))
            .sink(sink.clone())
            .build();

        assert_eq!(pipeline.id(), "scrub");
        assert_eq!(pipeline.filter_chain().len(), 2);
        pipeline.execute().unwrap();
        assert_eq!(sink.events()[0].payload(), &json!({"user": "ada"}));
    }

    #[test]
    fn test_filters_need_registered_types() {
        let definition =
            PipelineDefinition::from_json(r#"{"name": "p", "filters": [{"type": "rename"}]}"#)
                .unwrap();
        let bare = PipelineFactory::new(
            Arc::new(StageRegistry::with_builtin_stages().unwrap()),
            ContextRegistry::new(),
        );
        assert!(matches!(
            bare.create_filter_chain(&definition),
            Err(PeleeError::UnknownFilterType(_))
        ));
        assert!(factory().create_filter_chain(&definition).is_ok());
    }

    #[test]
    fn test_create_enhanced_rejects_branches_and_bad_strategy() {
        let branches = PipelineDefinition::from_json(
            r#"{"name": "p", "context": "batch", "branches": {"x": []}}"#,
        )
        .unwrap();
        assert!(matches!(
            factory().create_enhanced(&branches),
            Err(PeleeError::ConfigError(_))
        ));

        let strategy =
            PipelineDefinition::from_json(r#"{"name": "p", "context": "spiral"}"#).unwrap();
        assert!(factory().create_enhanced(&strategy).is_err());
    }
}
