use crate::error::{PeleeError, PeleeResult};
use crate::registry::PipelineDefinition;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Pipeline definitions loaded from a directory, keyed by file stem
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    definitions: BTreeMap<String, PipelineDefinition>,
}

impl PipelineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in `dir`
    ///
    /// Files that fail to parse are logged and skipped; only an unreadable
    /// directory is an error.
    pub fn load_dir(dir: impl AsRef<Path>) -> PeleeResult<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match PipelineDefinition::from_file(&path) {
                Ok(definition) => {
                    catalog.insert(id, definition);
                }
                Err(e) => warn!("Skipping pipeline definition {}: {}", path.display(), e),
            }
        }

        info!(
            "Loaded {} pipeline definitions from {}",
            catalog.len(),
            dir.display()
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, id: impl Into<String>, definition: PipelineDefinition) {
        self.definitions.insert(id.into(), definition);
    }

    pub fn get(&self, id: &str) -> PeleeResult<&PipelineDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| PeleeError::PipelineNotFound(id.to_string()))
    }

    /// Catalog ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
