//! Multi-strategy pipeline engine
//!
//! [`EnhancedPipeline`] runs [`EnhancedStage`]s under one of four
//! [`ExecutionStrategy`]s with an explicit lifecycle:
//! initialize once, then validate, process, flush and cleanup per run.
//! Chained stages from [`crate::pipeline`] plug in through [`StageAdapter`].

pub mod context;
pub mod executor;
pub mod pool;
pub mod stage;
pub mod strategy;

pub use context::{EnhancedContext, StageInfo};
pub use executor::{EnhancedPipeline, EnhancedPipelineBuilder, EnhancedStageRef, ExecutionResult};
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use stage::{EnhancedStage, StageAdapter, StageHealth, StageStats, StatsSnapshot};
pub use strategy::{
    AllStages, CollectResults, ExecutionStrategy, FirstResult, NamedStages, ResultMerge,
    StagePolicy,
};
