use super::descriptor::{stage_type_of, StageDescriptor};
use crate::error::{PeleeError, PeleeResult};
use crate::pipeline::stages::builtin_descriptors;
use crate::pipeline::StageRef;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Registry mapping stage type codes to descriptors
///
/// Built once at startup from an explicit descriptor list and shared
/// read-only afterwards (wrap it in an `Arc` to hand it to several
/// factories). Registering a type code twice is an error.
///
/// # Example
/// ```
/// use pelee_lib::registry::StageRegistry;
/// use serde_json::json;
///
/// let registry = StageRegistry::with_builtin_stages()?;
/// let stage = registry.create(&json!({"type": "rename", "mappings": {"a": "b"}}))?;
/// assert_eq!(stage.name(), "rename");
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
#[derive(Default)]
pub struct StageRegistry {
    descriptors: HashMap<String, Box<dyn StageDescriptor>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in stage type
    pub fn with_builtin_stages() -> PeleeResult<Self> {
        Self::from_descriptors(builtin_descriptors())
    }

    pub fn from_descriptors<I>(descriptors: I) -> PeleeResult<Self>
    where
        I: IntoIterator<Item = Box<dyn StageDescriptor>>,
    {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Add a descriptor
    ///
    /// # Errors
    ///
    /// Returns [`PeleeError::DuplicateStageType`] if the type code is taken;
    /// the registry is left unchanged.
    pub fn register(&mut self, descriptor: Box<dyn StageDescriptor>) -> PeleeResult<()> {
        let code = descriptor.type_code().to_string();
        if self.descriptors.contains_key(&code) {
            return Err(PeleeError::DuplicateStageType(code));
        }
        debug!(stage_type = %code, "Registered stage type");
        self.descriptors.insert(code, descriptor);
        Ok(())
    }

    /// Build a stage from a `{"type": ...}` configuration node
    ///
    /// # Errors
    ///
    /// - [`PeleeError::MissingStageType`] if the node has no discriminator
    /// - [`PeleeError::UnknownStageType`] if no descriptor has that code
    /// - [`PeleeError::InvalidStageConfig`] if the remaining fields don't fit
    pub fn create(&self, config: &Value) -> PeleeResult<StageRef> {
        let code = stage_type_of(config)?;
        let descriptor = self
            .descriptors
            .get(code)
            .ok_or_else(|| PeleeError::UnknownStageType(code.to_string()))?;
        descriptor.create(config)
    }

    /// Build every stage of a processor list, failing on the first bad node
    pub fn create_all(&self, configs: &[Value]) -> PeleeResult<Vec<StageRef>> {
        configs.iter().map(|config| self.create(config)).collect()
    }

    pub fn get(&self, code: &str) -> Option<&dyn StageDescriptor> {
        self.descriptors.get(code).map(|d| d.as_ref())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.descriptors.contains_key(code)
    }

    /// Registered type codes, sorted
    pub fn type_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
