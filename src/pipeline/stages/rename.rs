use crate::error::PeleeResult;
use crate::event::Event;
use crate::pipeline::{Stage, StageContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::object_at;

pub const TYPE_CODE: &str = "rename";

/// Configuration for [`RenameStage`]
///
/// Either a `mappings` table (`{"old": "new"}`) or a single `source`/`dest`
/// pair; both may be given. `path` is a JSON pointer to the object whose keys
/// are renamed and defaults to the payload root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenameConfig {
    pub path: Option<String>,
    pub mappings: BTreeMap<String, String>,
    pub source: Option<String>,
    pub dest: Option<String>,
}

/// Stage that renames keys inside an object
///
/// Keys that are missing, or mapped onto themselves, are left alone. A
/// target that is not an object is passed through untouched.
///
/// # Example
/// ```
/// use pelee_lib::event::Event;
/// use pelee_lib::pipeline::Pipeline;
/// use pelee_lib::pipeline::stages::RenameStage;
/// use serde_json::json;
///
/// let pipeline = Pipeline::builder("rename")
///     .add_stage(RenameStage::single("user", "customer"))
///     .build();
///
/// let mut event = Event::new(json!({"user": "ada"}));
/// pipeline.execute(&mut event)?;
/// assert_eq!(event.payload(), &json!({"customer": "ada"}));
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
pub struct RenameStage {
    path: Option<String>,
    mappings: Vec<(String, String)>,
}

impl RenameStage {
    pub fn new(config: RenameConfig) -> Self {
        let mut mappings: Vec<(String, String)> = config.mappings.into_iter().collect();
        if let (Some(source), Some(dest)) = (config.source, config.dest) {
            mappings.push((source, dest));
        }
        Self {
            path: config.path,
            mappings,
        }
    }

    /// Rename one root-level key
    pub fn single(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            path: None,
            mappings: vec![(from.into(), to.into())],
        }
    }

    fn apply(&self, event: &mut Event) {
        let Some(object) = object_at(event.payload_mut(), self.path.as_deref()) else {
            return;
        };
        for (from, to) in &self.mappings {
            if from == to {
                continue;
            }
            if let Some(value) = object.remove(from) {
                object.insert(to.clone(), value);
            }
        }
    }
}

impl Stage for RenameStage {
    fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
        self.apply(event);
        context.next(event)
    }

    fn name(&self) -> &str {
        TYPE_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DetachedContext, StopSignal};
    use serde_json::json;

    fn run(stage: &RenameStage, payload: serde_json::Value) -> serde_json::Value {
        let signal = StopSignal::new();
        let mut event = Event::new(payload);
        stage
            .process(&mut event, &mut DetachedContext::new(&signal))
            .unwrap();
        event.into_payload()
    }

    #[test]
    fn test_rename_moves_value() {
        let stage = RenameStage::single("a", "b");
        assert_eq!(run(&stage, json!({"a": 1, "c": 3})), json!({"b": 1, "c": 3}));
    }

    #[test]
    fn test_rename_missing_and_identity_are_noops() {
        let config = RenameConfig {
            mappings: [("x".to_string(), "y".to_string()), ("c".to_string(), "c".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let stage = RenameStage::new(config);
        assert_eq!(run(&stage, json!({"c": 3})), json!({"c": 3}));
    }

    #[test]
    fn test_rename_nested_path_and_single_pair() {
        let config: RenameConfig = serde_json::from_value(json!({
            "path": "/user",
            "source": "nm",
            "dest": "name"
        }))
        .unwrap();
        let stage = RenameStage::new(config);
        assert_eq!(
            run(&stage, json!({"user": {"nm": "ada"}, "nm": "root"})),
            json!({"user": {"name": "ada"}, "nm": "root"})
        );
    }

    #[test]
    fn test_rename_non_object_passes_through() {
        let stage = RenameStage::single("a", "b");
        assert_eq!(run(&stage, json!([1, 2])), json!([1, 2]));
    }
}
