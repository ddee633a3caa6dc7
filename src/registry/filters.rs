use super::descriptor::{parse_config, stage_type_of};
use crate::error::{PeleeError, PeleeResult};
use crate::pipeline::filters::{RemoveFilter, RenameFilter};
use crate::pipeline::stages::{RemoveConfig, RenameConfig};
use crate::pipeline::{FilterChain, FilterRef};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Pairs a filter type code with a factory that builds the filter
pub trait FilterDescriptor: Send + Sync {
    fn type_code(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Build a filter from its configuration node
    fn create(&self, config: &Value) -> PeleeResult<FilterRef>;
}

type Factory<C> = dyn Fn(C) -> PeleeResult<FilterRef> + Send + Sync;

/// Filter descriptor with a typed configuration shape `C`
///
/// Configuration nodes use the same `type`/`code` discriminator as stages.
pub struct TypedFilter<C> {
    type_code: String,
    description: String,
    factory: Box<Factory<C>>,
    _config: PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> TypedFilter<C> {
    pub fn new<F>(type_code: impl Into<String>, factory: F) -> Self
    where
        F: Fn(C) -> PeleeResult<FilterRef> + Send + Sync + 'static,
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

impl<C: DeserializeOwned> FilterDescriptor for TypedFilter<C> {
    fn type_code(&self) -> &str {
        &self.type_code
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn create(&self, config: &Value) -> PeleeResult<FilterRef> {
        let typed = parse_config(&self.type_code, config)?;
        (self.factory)(typed)
    }
}

/// Descriptors for every built-in filter type
pub fn builtin_filter_descriptors() -> Vec<Box<dyn FilterDescriptor>> {
    vec![
        Box::new(
            TypedFilter::new(RenameFilter::TYPE_CODE, |config: RenameConfig| {
                Ok(Arc::new(RenameFilter::new(config)) as _)
            })
            .with_description("Rename object keys"),
        ),
        Box::new(
            TypedFilter::new(RemoveFilter::TYPE_CODE, |config: RemoveConfig| {
                Ok(Arc::new(RemoveFilter::new(config)) as _)
            })
            .with_description("Remove object keys"),
        ),
    ]
}

/// Registry mapping filter type codes to descriptors
///
/// # Example
/// ```
/// use pelee_lib::event::Event;
/// use pelee_lib::registry::FilterRegistry;
/// use serde_json::json;
///
/// let registry = FilterRegistry::with_builtin_filters()?;
/// let chain = registry.create_chain(&[json!({"type": "remove", "fields": ["secret"]})])?;
///
/// let output = chain.process(Event::new(json!({"secret": 1, "id": 2})))?;
/// assert_eq!(output.event.payload(), &json!({"id": 2}));
/// # Ok::<(), pelee_lib::error::PeleeError>(())
/// ```
#[derive(Default)]
pub struct FilterRegistry {
    descriptors: HashMap<String, Box<dyn FilterDescriptor>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_filters() -> PeleeResult<Self> {
        let mut registry = Self::new();
        for descriptor in builtin_filter_descriptors() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Add a descriptor
    ///
    /// # Errors
    ///
    /// Returns [`PeleeError::DuplicateFilterType`] if the type code is taken.
    pub fn register(&mut self, descriptor: Box<dyn FilterDescriptor>) -> PeleeResult<()> {
        let code = descriptor.type_code().to_string();
        if self.descriptors.contains_key(&code) {
            return Err(PeleeError::DuplicateFilterType(code));
        }
        debug!(filter_type = %code, "Registered filter type");
        self.descriptors.insert(code, descriptor);
        Ok(())
    }

    pub fn create(&self, config: &Value) -> PeleeResult<FilterRef> {
        let code = stage_type_of(config)?;
        let descriptor = self
            .descriptors
            .get(code)
            .ok_or_else(|| PeleeError::UnknownFilterType(code.to_string()))?;
        descriptor.create(config)
    }

    /// Build a chain from filter nodes, in order
    pub fn create_chain(&self, configs: &[Value]) -> PeleeResult<FilterChain> {
        let mut chain = FilterChain::new();
        for config in configs {
            chain = chain.with_filter_ref(self.create(config)?);
        }
        Ok(chain)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.descriptors.contains_key(code)
    }

    /// Registered codes, sorted
    pub fn type_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    pub fn get(&self, code: &str) -> Option<&dyn FilterDescriptor> {
        self.descriptors.get(code).map(|d| d.as_ref())
    }
}
