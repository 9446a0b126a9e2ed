//! Core error types and context traits

use thiserror::Error;

/// Result type alias for analysis subsystem operations
pub type NewsdeskResult<T> = Result<T, NewsdeskError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> NewsdeskResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> NewsdeskResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> NewsdeskResult<T> {
        self.map_err(|e| NewsdeskError::other(format!("{}: {}", context, e)))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> NewsdeskResult<T> {
        self.map_err(|e| NewsdeskError::other(format!("{}: {}", f(), e)))
    }
}

/// Main error type for the analysis subsystem
///
/// Content problems (empty or policy-blocked completions) are deliberately
/// absent: they are not errors. Providers coerce them to placeholder text so
/// downstream flows always receive a string.
#[derive(Error, Debug, Clone)]
pub enum NewsdeskError {
    /// Network, timeout, and HTTP status failures at the transport layer
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        status_code: Option<u16>,
        context: Option<String>,
    },

    /// Failures raised inside a provider's own request logic
    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Missing or invalid provider configuration; never retried
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Response body was not valid JSON despite a success status
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        context: Option<String>,
    },

    /// Prompt rendering failed before any network call
    #[error("Prompt error: {message}")]
    Prompt { message: String },

    /// Persisting an analysis record failed
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        context: Option<String>,
    },

    /// Generic error with context
    #[error("Error: {message}")]
    Other { message: String },
}
