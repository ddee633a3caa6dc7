use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{Stage, StageContext};
use serde::{Deserialize, Serialize};

use super::object_at;

pub const TYPE_CODE: &str = "remove";

/// Configuration for [`RemoveStage`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoveConfig {
    pub path: Option<String>,
    pub fields: Vec<String>,
}

/// Stage that removes keys from an object
pub struct RemoveStage {
    config: RemoveConfig,
}

impl RemoveStage {
    pub fn new(config: RemoveConfig) -> Self {
        Self { config }
    }

    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RemoveConfig {
            path: None,
            fields: fields.into_iter().map(Into::into).collect(),
        })
    }
}

impl Stage for RemoveStage {
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
        if let Some(object) = object_at(event.payload_mut(), self.config.path.as_deref()) {
            for field in &self.config.fields {
                object.remove(field);
            }
        }
        context.next(event)
    }

    fn name(&self) -> &str {
        TYPE_CODE
    }
}
