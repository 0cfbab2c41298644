//! One complete load-test run: sink lifecycle, journey, purge.

use std::convert::Infallible;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::LoadTestConfig;
use crate::errors::{Result, StepError};
use crate::scheduler::{ExecutionContext, Journey, Scheduler, UserContext};
use crate::telemetry::{Instrumentation, Params, SinkSummary, TelemetrySink};

/// Result of a finished run.
#[derive(Debug)]
pub struct RunSummary {
    /// Finished user contexts, ordered by index.
    pub users: Vec<UserContext>,
    /// Rows written and lost by the telemetry sink.
    pub telemetry: SinkSummary,
    /// Wall-clock time of the whole run.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Terminal failures across users, applications and components.
    pub fn failures(&self) -> impl Iterator<Item = &StepError> + '_ {
        self.users.iter().flat_map(|user| {
            let apps = user.applications.iter().flat_map(|app| {
                let comps = app.components.iter().filter_map(ExecutionContext::failure);
                app.failure().into_iter().chain(comps)
            });
            user.failure().into_iter().chain(apps)
        })
    }
}

/// Drives a journey with a fresh telemetry sink.
#[derive(Debug, Clone)]
pub struct LoadTest {
    config: LoadTestConfig,
}

impl LoadTest {
    /// Validates the configuration.
    pub fn new(config: LoadTestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Runs `journey` to completion.
    ///
    /// Step failures never fail the run; they end up in the errors file and
    /// in [`RunSummary::failures`]. Only sink setup and shutdown errors are
    /// returned.
    pub async fn run(&self, journey: &Journey) -> Result<RunSummary> {
        let started = Instant::now();
        let config = &self.config;
        let sink = TelemetrySink::start(&config.output_dir, &config.telemetry).await?;
        let instr = Instrumentation::new(sink.clone());
        let scheduler = Scheduler::new(config.clone(), instr.clone());

        info!(
            concurrency = config.concurrency,
            applications = config.applications_count,
            components = config.components_count,
            repeats = config.journey_repeats,
            output_dir = %config.output_dir.display(),
            "Starting load test"
        );

        let params = Params::new()
            .with("concurrency", config.concurrency)
            .with("applications", config.applications_count)
            .with("components", config.components_count)
            .with("repeats", config.journey_repeats);
        let measured = instr
            .measure("setup", params.clone(), async {
                Ok::<_, Infallible>(journey.execute(&scheduler).await)
            })
            .await;
        let mut users = match measured {
            Ok(users) => users,
            Err(never) => match never {},
        };

        if config.purge || config.purge_only {
            let purged = instr
                .measure("purge", params, async {
                    journey.purge(&scheduler, &mut users).await;
                    Ok::<_, Infallible>(())
                })
                .await;
            if let Err(never) = purged {
                match never {}
            }
        }

        let telemetry = sink.stop().await?;
        let summary = RunSummary {
            users,
            telemetry,
            elapsed: started.elapsed(),
        };

        let failures = summary.failures().count();
        if failures > 0 || summary.telemetry.measurements_lost > 0 || summary.telemetry.errors_lost > 0 {
            warn!(
                failures,
                measurements_lost = summary.telemetry.measurements_lost,
                errors_lost = summary.telemetry.errors_lost,
                "Load test finished with failures"
            );
        }
        info!(
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            measurements = summary.telemetry.measurements_written,
            errors = summary.telemetry.errors_written,
            "Load test finished"
        );
        Ok(summary)
    }
}
