use crate::error::{PeleeError, PeleeResult};
use crate::pipeline::{BranchingContext, SequenceContext, StageContext};
use std::collections::HashMap;

type ContextFactory = Box<dyn Fn() -> Box<dyn StageContext> + Send + Sync>;

/// Registry mapping context codes (`sequence`, `branching`, ...) to constructors
pub struct ContextRegistry {
    factories: HashMap<String, ContextFactory>,
}

impl ContextRegistry {
    /// Empty registry, for embedders that bring their own contexts
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `sequence` and `branching` contexts
    pub fn new() -> Self {
        let mut factories: HashMap<String, ContextFactory> = HashMap::new();
        factories.insert(
            SequenceContext::CODE.to_string(),
            Box::new(|| -> Box<dyn StageContext> { Box::new(SequenceContext::new()) }),
        );
        factories.insert(
            BranchingContext::CODE.to_string(),
            Box::new(|| -> Box<dyn StageContext> { Box::new(BranchingContext::new()) }),
        );
        Self { factories }
    }

    /// # Errors
    ///
    /// Returns [`PeleeError::DuplicateContextType`] if `code` is taken.
    pub fn register<F>(&mut self, code: impl Into<String>, factory: F) -> PeleeResult<()>
    where
        F: Fn() -> Box<dyn StageContext> + Send + Sync + 'static,
    {
        let code = code.into();
        if self.factories.contains_key(&code) {
            return Err(PeleeError::DuplicateContextType(code));
        }
        self.factories.insert(code, Box::new(factory));
        Ok(())
    }

    /// Fresh context for the given code
    pub fn create(&self, code: &str) -> PeleeResult<Box<dyn StageContext>> {
        self.factories
            .get(code)
            .map(|factory| factory())
            .ok_or_else(|| PeleeError::UnknownContextType(code.to_string()))
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
