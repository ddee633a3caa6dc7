use crate::error::{PeleeError, PeleeResult};
use crate::pipeline::StageRef;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Configuration keys that select the stage type rather than configure it
pub const DISCRIMINATOR_KEYS: [&str; 2] = ["type", "code"];

/// Pairs a stage type code with a factory that builds the stage
///
/// Descriptors are stateless; the registry owns them and shares them
/// between every pipeline it assembles.
pub trait StageDescriptor: Send + Sync {
    /// Unique code used in `{"type": ...}` configuration nodes
    fn type_code(&self) -> &str;

    /// Human readable summary, shown by `pelee stages`
    fn description(&self) -> &str {
        ""
    }

    /// Build a stage from its configuration node
    ///
    /// # Errors
    ///
    /// Returns [`PeleeError::InvalidStageConfig`] when the node does not
    /// match the stage's configuration shape.
    fn create(&self, config: &Value) -> PeleeResult<StageRef>;
}

type Factory<C> = dyn Fn(C) -> PeleeResult<StageRef> + Send + Sync;

/// Descriptor with a typed configuration shape `C`
///
/// The discriminator keys are stripped from the node before it is
/// deserialized into `C`, so configuration types can deny unknown fields.
///
/// # Example
/// ```
/// use pelee_lib::registry::{Descriptor, StageDescriptor};
/// use pelee_lib::pipeline::stages::{RenameConfig, RenameStage};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let descriptor = Descriptor::new("rename", |config: RenameConfig| {
///     Ok(Arc::new(RenameStage::new(config)) as _)
/// });
/// let stage = descriptor.create(&json!({"type": "rename", "mappings": {"a": "b"}}))?;
/// assert_eq!(stage.name(), "rename");
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
pub struct Descriptor<C> {
    type_code: String,
    description: String,
    factory: Box<Factory<C>>,
    _config: PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> Descriptor<C> {
    pub fn new<F>(type_code: impl Into<String>, factory: F) -> Self
    where
        F: Fn(C) -> PeleeResult<StageRef> + Send + Sync + 'static,
    {
        Self {
            type_code: type_code.into(),
            description: String::new(),
            factory: Box::new(factory),
            _config: PhantomData,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

}

impl<C: DeserializeOwned> StageDescriptor for Descriptor<C> {
    fn type_code(&self) -> &str {
        &self.type_code
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn create(&self, config: &Value) -> PeleeResult<StageRef> {
        let typed = parse_config(&self.type_code, config)?;
        (self.factory)(typed)
    }
}

/// Deserialize a configuration node into `C`, ignoring its discriminator keys
///
/// A `null` node reads as an empty object.
pub fn parse_config<C: DeserializeOwned>(type_code: &str, config: &Value) -> PeleeResult<C> {
    let mut node = match config {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    if let Value::Object(map) = &mut node {
        for key in DISCRIMINATOR_KEYS {
            map.remove(key);
        }
    }
    serde_json::from_value(node).map_err(|e| PeleeError::InvalidStageConfig {
        stage_type: type_code.to_string(),
        message: e.to_string(),
    })
}

/// Read the discriminator of a stage configuration node
pub fn stage_type_of(config: &Value) -> PeleeResult<&str> {
    DISCRIMINATOR_KEYS
        .iter()
        .find_map(|key| config.get(key).and_then(Value::as_str))
        .ok_or(PeleeError::MissingStageType)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::pipeline::{Stage, StageContext};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TagConfig {
        tag: String,
    }

    struct TagStage(String);

    impl Stage for TagStage {
        fn process(&self, event: &mut Event, context: &mut dyn StageContext) -> PeleeResult<()> {
            event.set_metadata("tag", json!(self.0));
            context.next(event)
        }
    }

    fn tag_descriptor() -> Descriptor<TagConfig> {
        Descriptor::new("tag", |config: TagConfig| {
            Ok(Arc::new(TagStage(config.tag)) as StageRef)
        })
        .with_description("Adds a tag")
    }

    #[test]
    fn test_create_strips_discriminator() {
        let descriptor = tag_descriptor();
        let stage = descriptor
            .create(&json!({"type": "tag", "tag": "blue"}))
            .unwrap();

        let mut event = Event::new(json!({}));
        let signal = crate::pipeline::StopSignal::new();
        stage
            .process(&mut event, &mut crate::pipeline::DetachedContext::new(&signal))
            .unwrap();
        assert_eq!(event.metadata("tag"), Some(&json!("blue")));
        assert_eq!(descriptor.description(), "Adds a tag");
    }

    #[test]
    fn test_create_reports_bad_shape() {
        let err = tag_descriptor()
            .create(&json!({"code": "tag", "colour": 1}))
            .err()
            .unwrap();
        match err {
            PeleeError::InvalidStageConfig { stage_type, .. } => assert_eq!(stage_type, "tag"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stage_type_of() {
        assert_eq!(stage_type_of(&json!({"type": "a"})).unwrap(), "a");
        assert_eq!(stage_type_of(&json!({"code": "b"})).unwrap(), "b");
        assert!(matches!(
            stage_type_of(&json!({"mappings": {}})),
            Err(PeleeError::MissingStageType)
        ));
    }
}
