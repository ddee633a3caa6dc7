use thiserror::Error;

/// Central error type for the pipeline engine
#[derive(Error, Debug)]
pub enum PeleeError {
    // ============================================================================
    // Configuration Errors (raised while assembling a pipeline, never at run time)
    // ============================================================================
    #[error("Invalid stage type: {0}")]
    UnknownStageType(String),

    #[error("Unknown context code: {0}")]
    UnknownContextType(String),

    #[error("Stage type already registered: {0}")]
    DuplicateStageType(String),

    #[error("Context code already registered: {0}")]
    DuplicateContextType(String),

    #[error("Invalid filter type: {0}")]
    UnknownFilterType(String),

    #[error("Filter type already registered: {0}")]
    DuplicateFilterType(String),

    #[error("Stage configuration has no 'type' or 'code' field")]
    MissingStageType,

    #[error("Invalid configuration for stage '{stage_type}': {message}")]
    InvalidStageConfig { stage_type: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============================================================================
    // Context Errors
    // ============================================================================
    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("Branch switch limit of {limit} exceeded entering '{branch}'")]
    BranchLimitExceeded { branch: String, limit: usize },

    // ============================================================================
    // Stage Lifecycle Errors
    // ============================================================================
    #[error("Stage '{stage}' failed to initialize: {message}")]
    Initialization { stage: String, message: String },

    #[error("Stage '{stage}' rejected event: {message}")]
    Validation { stage: String, message: String },

    #[error("Stage '{stage}' failed: {message}")]
    Processing { stage: String, message: String },

    #[error("Stage '{stage}' failed to flush: {message}")]
    Flush { stage: String, message: String },

    #[error("Stage '{stage}' failed to clean up: {message}")]
    Cleanup { stage: String, message: String },

    // ============================================================================
    // Execution Errors
    // ============================================================================
    #[error("Pipeline execution stopped due to error: {reason}")]
    ExecutionStopped {
        reason: String,
        #[source]
        source: Box<PeleeError>,
    },

    #[error("Pipeline '{0}' has not been initialized")]
    NotInitialized(String),

    #[error("Parallel execution failed: {0}")]
    ParallelExecution(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("{0}")]
    GenericError(String),
}

impl PeleeError {
    /// Build a processing error for the named stage
    pub fn processing(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PeleeError::Processing {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Build a validation error for the named stage
    pub fn validation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        PeleeError::Validation {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Whether this error already represents a stopped run
    pub fn is_stopped(&self) -> bool {
        matches!(self, PeleeError::ExecutionStopped { .. })
    }

    /// The innermost error, looking through `ExecutionStopped` wrappers
    pub fn root_cause(&self) -> &PeleeError {
        match self {
            PeleeError::ExecutionStopped { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for PeleeError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        PeleeError::LockError
    }
}

impl From<PeleeError> for String {
    fn from(error: PeleeError) -> Self {
        error.to_string()
    }
}

// Automatic conversion from String (for ad-hoc stage failures)
impl From<String> for PeleeError {
    fn from(err: String) -> Self {
        PeleeError::GenericError(err)
    }
}

// Automatic conversion from &str
impl From<&str> for PeleeError {
    fn from(err: &str) -> Self {
        PeleeError::GenericError(err.to_string())
    }
}

// Helper type alias for Results
pub type PeleeResult<T> = Result<T, PeleeError>;
