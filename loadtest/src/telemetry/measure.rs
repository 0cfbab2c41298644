//! Timing wrapper around arbitrary operations.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, trace, warn};

use super::entry::{ErrorEntry, MeasurementEntry};
use super::params::Params;
use super::sink::TelemetrySink;
use crate::errors::StepError;

/// Times operations and forwards the results to a [`TelemetrySink`].
///
/// Cheap to clone; every clone feeds the same sink.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    sink: Arc<TelemetrySink>,
}

impl Instrumentation {
    /// Creates an instrumentation handle for the given sink.
    #[must_use]
    pub fn new(sink: Arc<TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Returns the underlying sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<TelemetrySink> {
        &self.sink
    }

    /// Awaits `operation`, records how long it took, and returns its result
    /// unchanged.
    ///
    /// Exactly one measurement is recorded per call, whether the operation
    /// succeeds or fails.
    pub async fn measure<T, E, Fut>(&self, name: &str, params: Params, operation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let result = operation.await;
        let elapsed = started.elapsed();

        let error = result.as_ref().err().map(ToString::to_string);
        self.emit(name, &params, elapsed, error).await;
        result
    }

    /// Synchronous counterpart of [`measure`](Self::measure).
    pub async fn measure_fn<T, E, F>(&self, name: &str, params: Params, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let started = Instant::now();
        let result = operation();
        let elapsed = started.elapsed();

        let error = result.as_ref().err().map(ToString::to_string);
        self.emit(name, &params, elapsed, error).await;
        result
    }

    /// Records a terminal failure and returns it as a tagged [`StepError`].
    pub async fn fail(&self, code: u16, message: impl Into<String>) -> StepError {
        let err = StepError::new(code, message);
        self.record_failure(&err).await;
        err
    }

    /// Records an existing step failure in the errors file.
    pub async fn record_failure(&self, err: &StepError) {
        error!(code = err.code, message = %err.message, "Step failed");
        if let Err(e) = self
            .sink
            .record_error(ErrorEntry::new(err.code, err.message.clone()))
            .await
        {
            warn!(code = err.code, error = %e, "Failure not recorded");
        }
    }

    async fn emit(&self, name: &str, params: &Params, elapsed: std::time::Duration, error: Option<String>) {
        let parameters = params.render();
        trace!(
            metric = %name,
            duration = ?elapsed,
            params = %parameters,
            error = ?error,
            "Measured operation"
        );
        let entry = MeasurementEntry::new(name, elapsed, parameters, error);
        if let Err(e) = self.sink.record_measurement(entry).await {
            warn!(metric = %name, error = %e, "Measurement not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use std::time::Duration;

    async fn setup() -> (tempfile::TempDir, Instrumentation) {
        let dir = tempfile::tempdir().unwrap();
        let sink = TelemetrySink::start(dir.path(), &TelemetryConfig::default()).await.unwrap();
        (dir, Instrumentation::new(sink))
    }

    fn read(path: &std::path::Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_measure_success_passes_value_through() {
        let (_dir, instr) = setup().await;

        let value: Result<u32, StepError> = instr
            .measure("compute", Params::new().with("input", 21u64), async { Ok(42) })
            .await;
        assert_eq!(value.unwrap(), 42);

        let summary = instr.sink().stop().await.unwrap();
        assert_eq!(summary.measurements_written, 1);

        let contents = read(instr.sink().timings_path());
        let fields: Vec<&str> = contents.trim_end().split(',').collect();
        assert_eq!(fields[1], "compute");
        assert_eq!(fields[3], "input:21");
        assert_eq!(fields[4], "");
    }

    #[tokio::test]
    async fn test_measure_failure_passes_error_through() {
        let (_dir, instr) = setup().await;

        let result: Result<(), StepError> = instr
            .measure("create-component", Params::new(), async {
                Err(StepError::new(40, "Component failed creation"))
            })
            .await;
        assert_eq!(result.unwrap_err().code, 40);

        instr.sink().stop().await.unwrap();
        let contents = read(instr.sink().timings_path());
        assert!(contents.contains("create-component"));
        assert!(contents.contains("[40] Component failed creation"));
    }

    #[tokio::test]
    async fn test_measure_records_elapsed_time() {
        let (_dir, instr) = setup().await;

        let _: Result<(), StepError> = instr
            .measure("sleep", Params::new(), async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            })
            .await;

        instr.sink().stop().await.unwrap();
        let contents = read(instr.sink().timings_path());
        let seconds: f64 = contents.trim_end().split(',').nth(2).unwrap().parse().unwrap();
        assert!(seconds >= 0.02);
    }

    #[tokio::test]
    async fn test_measure_fn() {
        let (_dir, instr) = setup().await;

        let parsed: Result<i32, std::num::ParseIntError> =
            instr.measure_fn("parse", Params::new(), || "17".parse()).await;
        assert_eq!(parsed.unwrap(), 17);

        let summary = instr.sink().stop().await.unwrap();
        assert_eq!(summary.measurements_written, 1);
    }

    #[tokio::test]
    async fn test_fail_records_error_entry() {
        let (_dir, instr) = setup().await;

        let err = instr.fail(31, "Application failed validation").await;
        assert_eq!(err, StepError::new(31, "Application failed validation"));

        let summary = instr.sink().stop().await.unwrap();
        assert_eq!(summary.errors_written, 1);
        assert_eq!(summary.error_codes.get(&31), Some(&1));
        assert!(read(instr.sink().errors_path()).contains(",31,Application failed validation"));
    }

    #[tokio::test]
    async fn test_measure_after_stop_still_returns_result() {
        let (_dir, instr) = setup().await;
        instr.sink().stop().await.unwrap();

        let value: Result<&str, StepError> = instr.measure("late", Params::new(), async { Ok("ok") }).await;
        assert_eq!(value.unwrap(), "ok");
    }
}
