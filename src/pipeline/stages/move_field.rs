use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{Stage, StageContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::object_at;

pub const TYPE_CODE: &str = "move";

/// Configuration for [`MoveStage`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MoveConfig {
    #[serde(alias = "sourcePath")]
    pub source_path: Option<String>,
    pub source: String,
    #[serde(alias = "destPath")]
    pub dest_path: Option<String>,
    /// Key under the destination object; defaults to `source`
    pub dest: Option<String>,
    #[serde(alias = "keepSource")]
    pub keep_source: bool,
}

/// Stage that moves a value from one object to another
///
/// Nothing happens when the source key is absent, when either end is not
/// an object, when source and destination are the same slot, or when the
/// destination lies inside the moved value.
pub struct MoveStage {
    config: MoveConfig,
}

impl MoveStage {
    pub fn new(config: MoveConfig) -> Self {
        Self { config }
    }

    fn dest_key(&self) -> &str {
        self.config.dest.as_deref().unwrap_or(&self.config.source)
    }

    fn apply(&self, event: &mut Event) {
        let config = &self.config;
        let same_parent = normalize(config.source_path.as_deref())
            == normalize(config.dest_path.as_deref());
        if same_parent && self.dest_key() == config.source {
            return;
        }
        if self.dest_inside_source() {
            debug!(source = %config.source, "Destination lies inside the moved value, skipping");
            return;
        }

        let payload = event.payload_mut();
        if object_at(payload, config.dest_path.as_deref()).is_none() {
            return;
        }
        let Some(source) = object_at(payload, config.source_path.as_deref()) else {
            return;
        };
        let value = if config.keep_source {
            source.get(&config.source).cloned()
        } else {
            source.remove(&config.source)
        };
        let Some(value) = value else {
            return;
        };
        match object_at(payload, config.dest_path.as_deref()) {
            Some(dest) => {
                dest.insert(self.dest_key().to_string(), value);
            }
            None if !config.keep_source => {
                // Removal made the destination unreachable; put the value back
                if let Some(source) = object_at(payload, config.source_path.as_deref()) {
                    source.insert(config.source.clone(), value);
                }
            }
            None => {}
        }
    }

    /// True when `dest_path` points at the moved value or below it
    fn dest_inside_source(&self) -> bool {
        let config = &self.config;
        let moved = format!(
            "{}/{}",
            normalize(config.source_path.as_deref()),
            escape(&config.source)
        );
        let dest = normalize(config.dest_path.as_deref());
        dest == moved
            || dest
                .strip_prefix(moved.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn normalize(path: Option<&str>) -> &str {
    match path {
        None | Some("/") => "",
        Some(p) => p,
    }
}

impl Stage for MoveStage {
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
        self.apply(event);
        context.next(event)
    }

    fn name(&self) -> &str {
        TYPE_CODE
    }
}
