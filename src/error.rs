//! Error types for devloop
//!
//! Centralized error handling using thiserror. Every error also maps onto
//! an [`ErrorClass`] so the orchestrator can decide how far a failure reaches.

use std::path::PathBuf;

use thiserror::Error;

/// How far a failure propagates through a dev session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged or ignored, work continues
    Soft,
    /// Aborts the current build step (and with it the current cycle)
    StepFatal,
    /// Ends the whole session with a non-zero exit
    SessionFatal,
    /// Aborts the current cycle, the session keeps waiting for changes
    CycleFatal,
}

/// All error types that can occur in devloop
#[derive(Debug, Error)]
pub enum DevError {
    /// A bundler invocation failed
    #[error("Bundle '{build_name}' failed: {message}")]
    Bundle { build_name: String, message: String },

    /// The requested entry file does not exist in the source directory
    #[error("Entry '{entry}' not found in {}", dir.display())]
    EntryNotFound { dir: PathBuf, entry: String },

    /// The OS refused to spawn the application process
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The very first process start of a session failed
    #[error("Initial start failed: {0}")]
    InitialStartFailed(String),

    /// Two tools resolved to the same logical name
    #[error("Duplicate tool '{name}' in {} and {}", first.display(), second.display())]
    DuplicateTool { name: String, first: PathBuf, second: PathBuf },

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DevError {
    /// Classify this error for the orchestrator
    pub fn class(&self) -> ErrorClass {
        match self {
            DevError::Bundle { .. } | DevError::EntryNotFound { .. } | DevError::DuplicateTool { .. } => {
                ErrorClass::StepFatal
            }
            DevError::InitialStartFailed(_) | DevError::Config(_) | DevError::Yaml(_) => ErrorClass::SessionFatal,
            DevError::Spawn { .. } | DevError::Watch(_) | DevError::Io(_) => ErrorClass::CycleFatal,
        }
    }
}

impl From<notify::Error> for DevError {
    fn from(err: notify::Error) -> Self {
        DevError::Watch(err.to_string())
    }
}

/// Result type alias for devloop operations
pub type Result<T> = std::result::Result<T, DevError>;
