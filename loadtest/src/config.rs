//! Configuration for a load-test run.
//!
//! Durations are stored as fractional seconds so the config round-trips
//! through JSON cleanly; use the `Duration` accessors in code.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{HarnessError, Result};

/// Top-level configuration of a load-test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Number of concurrent simulated users.
    #[serde(default = "default_one")]
    pub concurrency: usize,
    /// Number of applications each user creates.
    #[serde(default = "default_one")]
    pub applications_count: usize,
    /// Number of components each application creates.
    #[serde(default = "default_one")]
    pub components_count: usize,
    /// How many times each user repeats the application fan-out.
    #[serde(default = "default_one")]
    pub journey_repeats: usize,
    /// Stop repeating once this much time has passed since the run started.
    #[serde(default = "default_journey_duration")]
    pub journey_duration_seconds: f64,
    /// Base startup delay for every worker except index 0.
    #[serde(default)]
    pub startup_delay_seconds: f64,
    /// Width of the uniform jitter window centred on the startup delay.
    #[serde(default)]
    pub startup_jitter_seconds: f64,
    /// Share one application between all applications of a user.
    #[serde(default)]
    pub reuse_applications: bool,
    /// Share one component between all components of an application.
    #[serde(default)]
    pub reuse_components: bool,
    /// How often reusing siblings check for the shared name.
    #[serde(default = "default_reuse_poll_interval")]
    pub reuse_poll_interval_seconds: f64,
    /// How long reusing siblings wait for the shared name.
    #[serde(default = "default_reuse_timeout")]
    pub reuse_timeout_seconds: f64,
    /// Prefix for generated usernames.
    #[serde(default = "default_username_prefix")]
    pub username_prefix: String,
    /// Run purge steps for every user after the journey.
    #[serde(default)]
    pub purge: bool,
    /// Provision users, purge, and skip the journey entirely.
    #[serde(default)]
    pub purge_only: bool,
    /// Directory that receives the telemetry CSV files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human readable text.
    #[serde(default)]
    pub log_json: bool,
    /// Telemetry sink settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_one() -> usize {
    1
}

fn default_journey_duration() -> f64 {
    3600.0
}

fn default_reuse_poll_interval() -> f64 {
    1.0
}

fn default_reuse_timeout() -> f64 {
    600.0
}

fn default_username_prefix() -> String {
    "testuser".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Converts fractional seconds, clamping NaN and negatives to zero and
/// saturating at `Duration::MAX`.
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_one(),
            applications_count: default_one(),
            components_count: default_one(),
            journey_repeats: default_one(),
            journey_duration_seconds: default_journey_duration(),
            startup_delay_seconds: 0.0,
            startup_jitter_seconds: 0.0,
            reuse_applications: false,
            reuse_components: false,
            reuse_poll_interval_seconds: default_reuse_poll_interval(),
            reuse_timeout_seconds: default_reuse_timeout(),
            username_prefix: default_username_prefix(),
            purge: false,
            purge_only: false,
            output_dir: default_output_dir(),
            log_level: default_log_level(),
            log_json: false,
            telemetry: TelemetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl LoadTestConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HarnessError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of concurrent users.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the number of applications per user.
    #[must_use]
    pub fn with_applications(mut self, count: usize) -> Self {
        self.applications_count = count;
        self
    }

    /// Sets the number of components per application.
    #[must_use]
    pub fn with_components(mut self, count: usize) -> Self {
        self.components_count = count;
        self
    }

    /// Sets the journey repeat count.
    #[must_use]
    pub fn with_journey_repeats(mut self, repeats: usize) -> Self {
        self.journey_repeats = repeats;
        self
    }

    /// Sets the journey duration cutoff.
    #[must_use]
    pub fn with_journey_duration(mut self, duration: Duration) -> Self {
        self.journey_duration_seconds = duration.as_secs_f64();
        self
    }

    /// Sets the startup stagger.
    #[must_use]
    pub fn with_startup(mut self, delay: Duration, jitter: Duration) -> Self {
        self.startup_delay_seconds = delay.as_secs_f64();
        self.startup_jitter_seconds = jitter.as_secs_f64();
        self
    }

    /// Enables or disables application and component reuse.
    #[must_use]
    pub fn with_reuse(mut self, applications: bool, components: bool) -> Self {
        self.reuse_applications = applications;
        self.reuse_components = components;
        self
    }

    /// Sets the reuse polling interval and timeout.
    #[must_use]
    pub fn with_reuse_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.reuse_poll_interval_seconds = poll_interval.as_secs_f64();
        self.reuse_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Enables purging after the run.
    #[must_use]
    pub fn with_purge(mut self, purge: bool, purge_only: bool) -> Self {
        self.purge = purge;
        self.purge_only = purge_only;
        self
    }

    /// Sets the username prefix.
    #[must_use]
    pub fn with_username_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.username_prefix = prefix.into();
        self
    }

    /// Gets the journey duration as a Duration.
    #[must_use]
    pub fn journey_duration(&self) -> Duration {
        seconds(self.journey_duration_seconds)
    }

    /// Gets the startup delay as a Duration.
    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        seconds(self.startup_delay_seconds)
    }

    /// Gets the startup jitter as a Duration.
    #[must_use]
    pub fn startup_jitter(&self) -> Duration {
        seconds(self.startup_jitter_seconds)
    }

    /// Gets the reuse polling interval as a Duration.
    #[must_use]
    pub fn reuse_poll_interval(&self) -> Duration {
        seconds(self.reuse_poll_interval_seconds)
    }

    /// Gets the reuse timeout as a Duration.
    #[must_use]
    pub fn reuse_timeout(&self) -> Duration {
        seconds(self.reuse_timeout_seconds)
    }

    /// Checks the configuration for values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(HarnessError::config("concurrency must be at least 1"));
        }
        if self.applications_count == 0 {
            return Err(HarnessError::config("applications_count must be at least 1"));
        }
        if self.components_count == 0 {
            return Err(HarnessError::config("components_count must be at least 1"));
        }
        if self.journey_repeats == 0 {
            return Err(HarnessError::config("journey_repeats must be at least 1"));
        }
        for (name, value) in [
            ("journey_duration_seconds", self.journey_duration_seconds),
            ("startup_delay_seconds", self.startup_delay_seconds),
            ("startup_jitter_seconds", self.startup_jitter_seconds),
            ("reuse_timeout_seconds", self.reuse_timeout_seconds),
            ("http.base_delay_seconds", self.http.base_delay_seconds),
            ("http.request_timeout_seconds", self.http.request_timeout_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HarnessError::config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
            if value >= Duration::MAX.as_secs_f64() {
                return Err(HarnessError::config(format!(
                    "{name} is too large, got {value}"
                )));
            }
        }
        if !self.reuse_poll_interval_seconds.is_finite()
            || self.reuse_poll_interval_seconds <= 0.0
            || self.reuse_poll_interval_seconds >= Duration::MAX.as_secs_f64()
        {
            return Err(HarnessError::config("reuse_poll_interval_seconds must be positive"));
        }
        if self.telemetry.batch_size == 0 {
            return Err(HarnessError::config("telemetry.batch_size must be at least 1"));
        }
        if self.telemetry.queue_capacity == 0 {
            return Err(HarnessError::config("telemetry.queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Telemetry sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Rows accumulated before one append-and-flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Bound of each producer queue; senders wait once it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_batch_size() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Retries after the first attempt on 5xx responses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential backoff.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: f64,
    /// Per-request timeout applied by the underlying client.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay() -> f64 {
    2.0
}

fn default_request_timeout() -> f64 {
    60.0
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_seconds: default_base_delay(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl HttpConfig {
    /// Gets the backoff base as a Duration.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        seconds(self.base_delay_seconds)
    }

    /// Gets the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        seconds(self.request_timeout_seconds)
    }
}
