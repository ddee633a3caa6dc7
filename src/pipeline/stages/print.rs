use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{Stage, StageContext};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const TYPE_CODE: &str = "print";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrintConfig {
    pub label: Option<String>,
}

/// Stage that logs the current payload at `info` level
pub struct PrintStage {
    label: String,
}

impl PrintStage {
    pub fn new(config: PrintConfig) -> Self {
        Self {
            label: config.label.unwrap_or_else(|| TYPE_CODE.to_string()),
        }
    }
}

impl Stage for PrintStage {
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
        info!(
            label = %self.label,
            context = context.code(),
            payload = %event.payload(),
            "Event"
        );
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
    use crate::pipeline::{stage_list, SequenceContext, StageRef};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_print_defaults_label_to_type_code() {
        assert_eq!(PrintStage::new(PrintConfig::default()).label, "print");
        let labelled = PrintStage::new(PrintConfig {
            label: Some("audit".to_string()),
        });
        assert_eq!(labelled.label, "audit");
    }

    #[test]
    fn test_print_leaves_event_and_continues() {
        let mut context = SequenceContext::with_stages(stage_list(vec![
            Arc::new(PrintStage::new(PrintConfig::default())) as StageRef,
            Arc::new(RenameStage::single("a", "b")),
        ]));
        let mut event = Event::new(json!({"a": [1, 2]}));

        context.next(&mut event).unwrap();

        assert_eq!(event.payload(), &json!({"b": [1, 2]}));
        assert_eq!(context.cursor(), 2);
    }
}
