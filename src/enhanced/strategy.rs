use super::context::EnhancedContext;
use super::stage::EnhancedStage;
use crate::error::{PeleeError, PeleeResult};
use crate::event::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// How an [`EnhancedPipeline`](super::EnhancedPipeline) drives its stages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Every stage in list order, stop flag checked before each stage
    #[default]
    #[serde(alias = "sequence")]
    Sequential,
    /// Every stage at once on the worker pool, joined before returning
    Parallel,
    /// Stages picked by a [`StagePolicy`], then run like `Sequential`
    Conditional,
    /// The full stage list once per element of an array payload
    Batch,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel => "parallel",
            ExecutionStrategy::Conditional => "conditional",
            ExecutionStrategy::Batch => "batch",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = PeleeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "sequence" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            "conditional" => Ok(ExecutionStrategy::Conditional),
            "batch" => Ok(ExecutionStrategy::Batch),
            _ => Err(PeleeError::UnknownContextType(s.to_string())),
        }
    }
}

/// Picks the stages that run under the conditional strategy
pub trait StagePolicy: Send + Sync {
    fn is_enabled(
        &self,
        index: usize,
        stage: &dyn EnhancedStage,
        event: &Event,
        context: &EnhancedContext,
    ) -> bool;
}

impl<F> StagePolicy for F
where
    F: Fn(usize, &dyn EnhancedStage, &Event, &EnhancedContext) -> bool + Send + Sync,
{
    fn is_enabled(
        &self,
        index: usize,
        stage: &dyn EnhancedStage,
        event: &Event,
        context: &EnhancedContext,
    ) -> bool {
        self(index, stage, event, context)
    }
}

/// Enables every stage
#[derive(Debug, Clone, Copy, Default)]
pub struct AllStages;

impl StagePolicy for AllStages {
    fn is_enabled(&self, _: usize, _: &dyn EnhancedStage, _: &Event, _: &EnhancedContext) -> bool {
        true
    }
}

/// Enables stages whose name is in a fixed set
#[derive(Debug, Clone, Default)]
pub struct NamedStages {
    names: HashSet<String>,
}

impl NamedStages {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl StagePolicy for NamedStages {
    fn is_enabled(&self, _: usize, stage: &dyn EnhancedStage, _: &Event, _: &EnhancedContext) -> bool {
        self.names.contains(stage.name())
    }
}

/// Combines the per-stage results of a parallel run into one event
pub trait ResultMerge: Send + Sync {
    /// `results` are in stage-list order, one per dispatched stage
    fn merge(&self, input: &Event, results: Vec<Event>) -> PeleeResult<Event>;
}

impl<F> ResultMerge for F
where
    F: Fn(&Event, Vec<Event>) -> PeleeResult<Event> + Send + Sync,
{
    fn merge(&self, input: &Event, results: Vec<Event>) -> PeleeResult<Event> {
        self(input, results)
    }
}

/// Result of the first stage in list order; the input when nothing ran
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstResult;

impl ResultMerge for FirstResult {
    fn merge(&self, input: &Event, results: Vec<Event>) -> PeleeResult<Event> {
        Ok(results.into_iter().next().unwrap_or_else(|| input.clone()))
    }
}

/// Array of every stage's payload, keeping the input's metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectResults;

impl ResultMerge for CollectResults {
    fn merge(&self, input: &Event, results: Vec<Event>) -> PeleeResult<Event> {
        let payloads = results.into_iter().map(Event::into_payload).collect();
        Ok(input.with_payload(Value::Array(payloads)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Named(&'static str);

    impl EnhancedStage for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn process_enhanced(&self, _: &mut Event, _: &EnhancedContext) -> PeleeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "sequence".parse::<ExecutionStrategy>().unwrap(),
            ExecutionStrategy::Sequential
        );
        assert_eq!(
            "PARALLEL".parse::<ExecutionStrategy>().unwrap(),
            ExecutionStrategy::Parallel
        );
        assert!("loop".parse::<ExecutionStrategy>().is_err());
        assert_eq!(ExecutionStrategy::default(), ExecutionStrategy::Sequential);

        let batch: ExecutionStrategy = serde_json::from_value(json!("batch")).unwrap();
        assert_eq!(batch.to_string(), "batch");
    }

    #[test]
    fn test_named_stages_policy() {
        let policy = NamedStages::new(["keep"]);
        let context = EnhancedContext::new("p");
        let event = Event::new(json!(null));
        assert!(policy.is_enabled(0, &Named("keep"), &event, &context));
        assert!(!policy.is_enabled(1, &Named("skip"), &event, &context));
        assert!(AllStages.is_enabled(1, &Named("skip"), &event, &context));
    }

    #[test]
    fn test_merge_policies() {
        let input = Event::new(json!("in")).with_metadata("k", json!(1));
        let results = vec![Event::new(json!("a")), Event::new(json!("b"))];

        let first = FirstResult.merge(&input, results.clone()).unwrap();
        assert_eq!(first.payload(), &json!("a"));

        let empty = FirstResult.merge(&input, Vec::new()).unwrap();
        assert_eq!(empty.payload(), &json!("in"));

        let all = CollectResults.merge(&input, results).unwrap();
        assert_eq!(all.payload(), &json!(["a", "b"]));
        assert_eq!(all.metadata("k"), Some(&json!(1)));
    }
}
