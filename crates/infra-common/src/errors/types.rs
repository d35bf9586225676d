use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the infrastructure layer
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(String),

    /// The consuming side of a task queue is gone
    #[error("Task queue '{0}' is closed")]
    QueueClosed(String),

    /// A timer was requested with no tokio runtime to run it on
    #[error("Task queue '{0}' has no runtime for timers")]
    NoRuntime(String),

    /// The logging subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),

    /// Free-form error, usually carrying context
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
