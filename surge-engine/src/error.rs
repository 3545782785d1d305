use thiserror::Error;

/// Errors that abort a stress run.
///
/// Per-request failures are never represented here; they are recorded as
/// data in `RequestResult` and `ConcurrentTestResult`.
#[derive(Error, Debug)]
pub enum StressError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target build or launch failed
    #[error("Setup failed: {0}")]
    Setup(String),

    /// Target never answered 200 OK within the startup window
    #[error("Target at {url} not ready after {waited_secs}s")]
    StartupTimeout { url: String, waited_secs: u64 },

    /// File or process I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Report generation error
    #[error("Report error: {0}")]
    Report(String),

    /// Invalid state error
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias using StressError
pub type Result<T> = std::result::Result<T, StressError>;

impl From<String> for StressError {
    fn from(s: String) -> Self {
        StressError::Other(s)
    }
}

impl From<&str> for StressError {
    fn from(s: &str) -> Self {
        StressError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for StressError {
    fn from(err: serde_json::Error) -> Self {
        StressError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for StressError {
    fn from(err: toml::ser::Error) -> Self {
        StressError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for StressError {
    fn from(err: csv::Error) -> Self {
        StressError::Report(err.to_string())
    }
}

impl From<config::ConfigError> for StressError {
    fn from(err: config::ConfigError) -> Self {
        StressError::Config(err.to_string())
    }
}
