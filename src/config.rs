use crate::enhanced::DEFAULT_WORKERS;
use crate::error::{PeleeError, PeleeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_ENV: &str = "PELEE_CONFIG";
pub const LOG_LEVEL_ENV: &str = "PELEE_LOG_LEVEL";
pub const PIPELINES_DIR_ENV: &str = "PELEE_PIPELINES_DIR";

/// Engine-wide settings, read from TOML
///
/// ```toml
/// pipelines_dir = "pipelines"
/// parallel_workers = 4
/// log_level = "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory scanned for `*.json` pipeline definitions
    pub pipelines_dir: PathBuf,
    /// Worker count for parallel enhanced pipelines
    pub parallel_workers: usize,
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pipelines_dir: PathBuf::from("pipelines"),
            parallel_workers: DEFAULT_WORKERS,
            log_level: "info".to_string(),
        }
    }
}

impl EngineSettings {
    /// Load settings from `path`, falling back to `$PELEE_CONFIG`
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// last in both cases.
    pub fn load(path: Option<&Path>) -> PeleeResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut settings = match path {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            Some(path) => {
                debug!("Settings file {} not found, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn load_from_file(path: &Path) -> PeleeResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|e| PeleeError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(contents: &str) -> PeleeResult<Self> {
        toml::from_str(contents)
            .map_err(|e| PeleeError::ConfigError(format!("Invalid settings: {}", e)))
    }

    /// Apply `PELEE_LOG_LEVEL` and `PELEE_PIPELINES_DIR` from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        if let Some(dir) = lookup(PIPELINES_DIR_ENV).filter(|v| !v.is_empty()) {
            self.pipelines_dir = PathBuf::from(dir);
        }
    }
}
