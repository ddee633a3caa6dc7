use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{Stage, StageContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::value_at;

pub const TYPE_CODE: &str = "route";

/// Configuration for [`RouteStage`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfig {
    /// JSON pointer to the routing value
    pub field: String,
    /// Routing value to branch name
    pub routes: HashMap<String, String>,
    /// Branch used when the value has no route
    pub default: Option<String>,
}

/// Stage that switches branch based on a field value
///
/// Only acts in contexts with the branching capability; elsewhere it simply
/// continues. Strings, numbers and booleans are matched by their text form.
/// A target equal to the active branch is not re-entered: the chain just
/// carries on from the current position.
pub struct RouteStage {
    config: RouteConfig,
}

impl RouteStage {
    pub fn new(config: RouteConfig) -> Self {
        Self { config }
    }

    /// Every branch name this stage can switch to
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.config
            .routes
            .values()
            .chain(self.config.default.as_ref())
            .map(String::as_str)
    }

    fn target(&self, event: &Event) -> Option<&str> {
        let key = match value_at(event.payload(), Some(&self.config.field)) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
            _ => None,
        };
        key.and_then(|k| self.config.routes.get(&k))
            .or(self.config.default.as_ref())
            .map(String::as_str)
    }
}

impl Stage for RouteStage {
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
        if let Some(target) = self.target(event) {
            if let Some(branching) = context.branching() {
                if branching.current_branch() == target {
                    debug!(branch = target, "Already on target branch");
                } else {
                    debug!(branch = target, "Routing event");
                    branching.switch_branch(target)?;
                }
            }
        }
        context.next(event)
    }

    fn name(&self) -> &str {
        TYPE_CODE
    }
}
