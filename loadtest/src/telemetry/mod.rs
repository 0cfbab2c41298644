//! Timing and failure telemetry.
//!
//! This module provides:
//! - MeasurementEntry and ErrorEntry records with their CSV row shapes
//! - Params, a structured parameter snapshot
//! - TelemetrySink, two batched background CSV writers
//! - Instrumentation, the wrapper that times operations into the sink

mod entry;
mod measure;
mod params;
mod sink;
mod writer;

pub use entry::{CsvRow, ErrorEntry, MeasurementEntry};
pub use measure::Instrumentation;
pub use params::{ParamValue, Params};
pub use sink::{SinkSummary, TelemetrySink, ERRORS_FILE, TIMINGS_FILE};
pub use writer::{CsvBatchWriter, WriterStats};
