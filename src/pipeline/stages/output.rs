use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{Stage, StageContext};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const TYPE_CODE: &str = "output";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub name: String,
}

/// Stage that copies the current event into a named output slot
pub struct OutputStage {
    name: String,
}

impl OutputStage {
    pub fn new(config: OutputConfig) -> Self {
        Self { name: config.name }
    }
}

impl Stage for OutputStage {
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
        match context.branching() {
            Some(branching) => branching.send_to_output(self.name.clone(), event),
            None => warn!(
                output = %self.name,
                context = context.code(),
                "Context has no output slots, skipping"
            ),
        }
        context.next(event)
    }

    fn name(&self) -> &str {
        TYPE_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::RenameStage;
    use crate::pipeline::{
        stage_list, BranchingContext, SequenceContext, StageRef, SupportsStageAssignment,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn output(name: &str) -> StageRef {
        Arc::new(OutputStage::new(OutputConfig {
            name: name.to_string(),
        }))
    }

    #[test]
    fn test_output_captures_event_as_it_was() {
        let mut context = BranchingContext::new();
        context.set_stages(stage_list(vec![
            output("before"),
            Arc::new(RenameStage::single("a", "b")) as StageRef,
        ]));
        let mut event = Event::new(json!({"a": 1}));

        context.next(&mut event).unwrap();

        assert_eq!(context.output("before").unwrap().payload(), &json!({"a": 1}));
        assert_eq!(event.payload(), &json!({"b": 1}));
    }

    #[test]
    fn test_output_without_slots_continues() {
        let mut context = SequenceContext::with_stages(stage_list(vec![
            output("ignored"),
            Arc::new(RenameStage::single("a", "b")) as StageRef,
        ]));
        let mut event = Event::new(json!({"a": 1}));

        context.next(&mut event).unwrap();

        assert_eq!(event.payload(), &json!({"b": 1}));
        assert!(!context.should_stop());
    }

    #[test]
    fn test_output_config_requires_name() {
        assert!(serde_json::from_value::<OutputConfig>(json!({})).is_err());
        assert!(serde_json::from_value::<OutputConfig>(json!({"name": "x", "extra": 1})).is_err());
    }
}
