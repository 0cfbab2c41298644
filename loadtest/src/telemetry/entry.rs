//! Telemetry records and their CSV row shapes.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Converts a record into one CSV row.
pub trait CsvRow {
    /// Returns the row's fields in column order.
    fn to_record(&self) -> Vec<String>;
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Timing of one instrumented operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Stable operation name.
    pub metric: String,
    /// Wall-clock time the operation took.
    pub duration: Duration,
    /// Rendered parameter snapshot.
    pub parameters: String,
    /// Error returned by the operation, if any.
    pub error: Option<String>,
}

impl MeasurementEntry {
    /// Creates a measurement stamped with the current time.
    #[must_use]
    pub fn new(
        metric: impl Into<String>,
        duration: Duration,
        parameters: impl Into<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            metric: metric.into(),
            duration,
            parameters: parameters.into(),
            error,
        }
    }

    /// Returns true if the operation failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl CsvRow for MeasurementEntry {
    fn to_record(&self) -> Vec<String> {
        vec![
            format_timestamp(&self.timestamp),
            self.metric.clone(),
            format!("{:.6}", self.duration.as_secs_f64()),
            self.parameters.clone(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

/// A terminal failure reported by a journey step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// Stable failure-site code.
    pub code: u16,
    /// Failure description.
    pub message: String,
}

impl ErrorEntry {
    /// Creates an error entry stamped with the current time.
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            code,
            message: message.into(),
        }
    }
}

impl CsvRow for ErrorEntry {
    fn to_record(&self) -> Vec<String> {
        vec![
            format_timestamp(&self.timestamp),
            self.code.to_string(),
            self.message.clone(),
        ]
    }
}
