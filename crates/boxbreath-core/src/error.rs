//! Core error types for boxbreath-core.
//!
//! The scheduler itself has no runtime error path: stale timers are voided by
//! their generation tag instead of being reported. Everything that can fail
//! lives at the edges (pattern input, collaborator calls, local config).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for boxbreath-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Pattern has nothing to animate (all phases zero or non-numeric).
    #[error("Invalid pattern for variant '{variant}': {message}")]
    InvalidPattern { variant: String, message: String },

    /// The config collaborator could not be reached or answered with an error.
    #[error("Config fetch failed: {0}")]
    ConfigFetchFailed(String),

    /// A chat reply did not carry a well-formed plan block.
    #[error("Plan parse failed: {0}")]
    PlanParseFailed(String),

    /// The chat collaborator could not be reached or answered with an error.
    #[error("Chat request failed: {0}")]
    ChatFailed(String),

    /// Local configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed collaborator base URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl CoreError {
    pub(crate) fn invalid_pattern(variant: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidPattern {
            variant: variant.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
