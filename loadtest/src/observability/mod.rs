//! Logging setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoadTestConfig;

/// Builds the log filter: `RUST_LOG` if set, else the configured level.
#[must_use]
pub fn env_filter(config: &LoadTestConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is kept.
pub fn init_tracing(config: &LoadTestConfig) -> bool {
    let json = config.log_json.then(|| tracing_subscriber::fmt::layer().json());
    let text = (!config.log_json).then(|| tracing_subscriber::fmt::layer().with_target(false));
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json)
        .with(text)
        .try_init()
        .is_ok()
}
