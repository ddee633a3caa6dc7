use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_VERSION: &str = "1.0";

/// Descriptive information attached to a pipeline at construction
///
/// Never mutated once attached; the `with_*` methods return copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    name: String,

    #[serde(default)]
    description: String,

    #[serde(default = "default_version")]
    version: String,

    #[serde(default)]
    properties: HashMap<String, Value>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl PipelineMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: default_version(),
            properties: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self.clone()
        }
    }

    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// Copy with one property added or replaced
    pub fn with_property(&self, key: impl Into<String>, value: Value) -> Self {
        let mut copy = self.clone();
        copy.properties.insert(key.into(), value);
        copy
    }

    pub fn with_properties<I>(&self, properties: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut copy = self.clone();
        copy.properties.extend(properties);
        copy
    }
}
