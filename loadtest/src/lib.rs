//! # loadtest
//!
//! A hierarchical load-test harness for platform APIs.
//!
//! The harness simulates many users, each creating applications, each
//! creating components, with:
//!
//! - **Fan-out scheduling**: user, application and component workers joined
//!   level by level, with staggered startup and optional resource reuse
//! - **Instrumentation**: every step is timed into a telemetry sink
//! - **Telemetry**: batched CSV files for timings and failures
//! - **Retrying HTTP transport**: exponential backoff on server errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loadtest::prelude::*;
//!
//! let config = LoadTestConfig::default()
//!     .with_concurrency(10)
//!     .with_applications(2)
//!     .with_components(3);
//! init_tracing(&config);
//!
//! let journey = Journey::new()
//!     .application_create_step(step_fn("create-application", |app: &mut ApplicationContext| {
//!         Box::pin(async move { platform.create_application(&app.application_name).await })
//!     }));
//!
//! let summary = LoadTest::new(config)?.run(&journey).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod harness;
pub mod observability;
pub mod scheduler;
pub mod telemetry;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{HttpConfig, LoadTestConfig, TelemetryConfig};
    pub use crate::errors::{codes, HarnessError, StepError};
    pub use crate::harness::{LoadTest, RunSummary};
    pub use crate::observability::init_tracing;
    pub use crate::scheduler::{
        step_fn, ApplicationContext, ComponentContext, ExecutionContext, Journey, Scheduler,
        Step, StepRef, UserContext,
    };
    pub use crate::telemetry::{Instrumentation, Params, SinkSummary, TelemetrySink};
    pub use crate::transport::{build_transport, HttpTransport, RetryPolicy, RetryTransport};
}
