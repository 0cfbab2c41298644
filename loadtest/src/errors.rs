//! Error types for the load-test harness.
//!
//! Two families live here: [`HarnessError`] for failures of the harness
//! machinery itself (configuration, telemetry files, HTTP plumbing), and
//! [`StepError`] for a terminal failure of one simulated journey step,
//! tagged with a stable numeric code.

use thiserror::Error;

/// Stable failure codes emitted by the harness itself.
///
/// Step functions pick their own codes for their failure sites; these are
/// reserved for failures the scheduler detects on their behalf.
pub mod codes {
    /// A harness-level error was converted into a step failure.
    pub const HARNESS: u16 = 1;
    /// A sibling waited too long for the shared application or component.
    pub const REUSE_TIMEOUT: u16 = 2;
    /// A worker task panicked before completing its journey.
    pub const WORKER_PANICKED: u16 = 3;
}

/// The main error type for harness operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The telemetry sink has already been stopped.
    #[error("Telemetry sink is closed")]
    SinkClosed,

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A terminal failure of a single journey step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct StepError {
    /// Stable identifier of the failure site.
    pub code: u16,
    /// Human readable description.
    pub message: String,
}

impl StepError {
    /// Creates a new step error.
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wraps any displayable error under the given code, prefixed by context.
    #[must_use]
    pub fn wrap(code: u16, context: &str, err: impl std::fmt::Display) -> Self {
        Self::new(code, format!("{context}: {err}"))
    }
}

impl From<HarnessError> for StepError {
    fn from(err: HarnessError) -> Self {
        Self::new(codes::HARNESS, err.to_string())
    }
}
