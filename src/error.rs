//! Error handling module for the payload service
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Resolver failures have their own tagged enum in `resolver`; everything else
//! that a payload call can fail with lives here.

use thiserror::Error;

use crate::resolver::ResolverError;
use crate::types::SourceType;

/// Main error type for payload operations
#[derive(Error, Debug)]
pub enum PayloadError {
    /// A source of this type cannot be attached to the payload
    #[error("Source type {0} is not supported by this payload.")]
    IncompatibleSource(SourceType),

    /// Sources could not be set up, or the source list is locked by ready sources
    #[error("Source setup error: {0}")]
    SourceSetup(String),

    /// One or more sources failed to tear down
    #[error("Source tear down error: {0}")]
    SourceTearDown(String),

    /// A value was requested before anything produced it
    #[error("{0}")]
    UnavailableValue(String),

    /// The environment is not known to the package metadata
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    /// The software selection cannot be installed
    #[error("Payload installation error: {0}")]
    PayloadInstallation(String),

    /// Lifecycle step requested out of order
    #[error("Lifecycle transition error: {0}")]
    LifecycleTransition(String),

    /// A background task with the same name is still in flight
    #[error("Task '{0}' is already running")]
    TaskAlreadyRunning(String),

    /// A task failed without a more specific error (panic, lost worker)
    #[error("Task '{name}' failed: {reason}")]
    TaskFailed { name: String, reason: String },

    /// Unclassified resolver failure propagated to the caller
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for payload operations
pub type Result<T> = std::result::Result<T, PayloadError>;

// Convenient error constructors
impl PayloadError {
    /// Create a source setup error
    pub fn source_setup(msg: impl Into<String>) -> Self {
        Self::SourceSetup(msg.into())
    }

    /// Create a source tear down error
    pub fn source_tear_down(msg: impl Into<String>) -> Self {
        Self::SourceTearDown(msg.into())
    }

    /// Create an unavailable value error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::UnavailableValue(msg.into())
    }

    /// Create a payload installation error
    pub fn installation(msg: impl Into<String>) -> Self {
        Self::PayloadInstallation(msg.into())
    }

    /// Create a lifecycle transition error
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::LifecycleTransition(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a task failure
    pub fn task_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
