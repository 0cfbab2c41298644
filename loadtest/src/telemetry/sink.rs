//! The telemetry sink: two queues, two background writers.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::entry::{ErrorEntry, MeasurementEntry};
use super::writer::{consume, CsvBatchWriter, WriterStats};
use crate::config::TelemetryConfig;
use crate::errors::{HarnessError, Result};

/// File name of the timings CSV inside the output directory.
pub const TIMINGS_FILE: &str = "load-test-timings.csv";
/// File name of the errors CSV inside the output directory.
pub const ERRORS_FILE: &str = "load-test-errors.csv";

/// Final statistics returned by [`TelemetrySink::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    /// Measurement rows appended to the timings file.
    pub measurements_written: u64,
    /// Measurement rows discarded after a write failure.
    pub measurements_lost: u64,
    /// Error rows appended to the errors file.
    pub errors_written: u64,
    /// Error rows discarded after a write failure.
    pub errors_lost: u64,
    /// Number of recorded errors per failure code.
    pub error_codes: BTreeMap<u16, u64>,
}

impl SinkSummary {
    /// Total number of recorded step failures.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.error_codes.values().sum()
    }
}

/// Batching, file-backed consumer of measurement and error entries.
///
/// Producers share the sink through an `Arc` and enqueue with
/// [`record_measurement`](Self::record_measurement) and
/// [`record_error`](Self::record_error). Each queue is bounded, so a
/// producer waits while its writer is behind; nothing is dropped while the
/// sink is running.
pub struct TelemetrySink {
    measurements_tx: RwLock<Option<mpsc::Sender<MeasurementEntry>>>,
    errors_tx: RwLock<Option<mpsc::Sender<ErrorEntry>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    measurement_stats: Arc<WriterStats>,
    error_stats: Arc<WriterStats>,
    error_codes: Mutex<BTreeMap<u16, u64>>,
    timings_path: PathBuf,
    errors_path: PathBuf,
}

impl TelemetrySink {
    /// Creates the output files and starts both writers.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(directory: impl AsRef<Path>, config: &TelemetryConfig) -> Result<Arc<Self>> {
        let directory = directory.as_ref();
        tokio::fs::create_dir_all(directory).await?;

        let timings = CsvBatchWriter::new(directory.join(TIMINGS_FILE));
        let errors = CsvBatchWriter::new(directory.join(ERRORS_FILE));
        timings.touch().await?;
        errors.touch().await?;

        let capacity = config.queue_capacity.max(1);
        let (measurements_tx, measurements_rx) = mpsc::channel(capacity);
        let (errors_tx, errors_rx) = mpsc::channel(capacity);

        let measurement_stats = Arc::new(WriterStats::default());
        let error_stats = Arc::new(WriterStats::default());

        let timings_path = timings.path().to_path_buf();
        let errors_path = errors.path().to_path_buf();

        let workers = vec![
            tokio::spawn(consume(
                "measurements",
                measurements_rx,
                timings,
                config.batch_size,
                measurement_stats.clone(),
            )),
            tokio::spawn(consume(
                "errors",
                errors_rx,
                errors,
                config.batch_size,
                error_stats.clone(),
            )),
        ];

        info!(
            timings = %timings_path.display(),
            errors = %errors_path.display(),
            batch_size = config.batch_size,
            "Telemetry sink started"
        );

        Ok(Arc::new(Self {
            measurements_tx: RwLock::new(Some(measurements_tx)),
            errors_tx: RwLock::new(Some(errors_tx)),
            workers: Mutex::new(workers),
            measurement_stats,
            error_stats,
            error_codes: Mutex::new(BTreeMap::new()),
            timings_path,
            errors_path,
        }))
    }

    /// Path of the timings CSV.
    #[must_use]
    pub fn timings_path(&self) -> &Path {
        &self.timings_path
    }

    /// Path of the errors CSV.
    #[must_use]
    pub fn errors_path(&self) -> &Path {
        &self.errors_path
    }

    /// Returns whether the sink still accepts entries.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.measurements_tx.read().is_some()
    }

    /// Enqueues a measurement, waiting while the queue is full.
    pub async fn record_measurement(&self, entry: MeasurementEntry) -> Result<()> {
        // Clone the sender so no lock is held across the await.
        let tx = self.measurements_tx.read().clone();
        let Some(tx) = tx else {
            warn!(metric = %entry.metric, "Measurement recorded after telemetry sink stopped");
            return Err(HarnessError::SinkClosed);
        };
        tx.send(entry).await.map_err(|_| HarnessError::SinkClosed)
    }

    /// Enqueues an error entry, waiting while the queue is full.
    pub async fn record_error(&self, entry: ErrorEntry) -> Result<()> {
        let tx = self.errors_tx.read().clone();
        let Some(tx) = tx else {
            warn!(code = entry.code, "Error recorded after telemetry sink stopped");
            return Err(HarnessError::SinkClosed);
        };
        let code = entry.code;
        tx.send(entry).await.map_err(|_| HarnessError::SinkClosed)?;
        *self.error_codes.lock().entry(code).or_insert(0) += 1;
        Ok(())
    }

    /// Closes both queues and waits until every buffered row is flushed.
    ///
    /// Call once, after all producers are done. A second call returns
    /// [`HarnessError::SinkClosed`].
    pub async fn stop(&self) -> Result<SinkSummary> {
        let measurements_tx = self.measurements_tx.write().take();
        let errors_tx = self.errors_tx.write().take();
        if measurements_tx.is_none() && errors_tx.is_none() {
            return Err(HarnessError::SinkClosed);
        }
        drop(measurements_tx);
        drop(errors_tx);

        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Telemetry writer task failed");
            }
        }

        let summary = SinkSummary {
            measurements_written: self.measurement_stats.written(),
            measurements_lost: self.measurement_stats.lost(),
            errors_written: self.error_stats.written(),
            errors_lost: self.error_stats.lost(),
            error_codes: self.error_codes.lock().clone(),
        };

        debug!(
            measurements = summary.measurements_written,
            errors = summary.errors_written,
            lost = summary.measurements_lost + summary.errors_lost,
            "Telemetry sink stopped"
        );

        Ok(summary)
    }
}

impl std::fmt::Debug for TelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySink")
            .field("timings_path", &self.timings_path)
            .field("errors_path", &self.errors_path)
            .field("running", &self.is_running())
            .finish()
    }
}
