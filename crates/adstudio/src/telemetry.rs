use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{AdStudioError, Result};

/// Installs the global subscriber. `RUST_LOG` overrides the configured
/// level; `log` records from the persistence layer are bridged in.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = Registry::default()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json().with_target(true)))
        .with((!config.json).then(|| fmt::layer().with_target(true)));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AdStudioError::Telemetry(e.to_string()))?;
    LogTracer::init().map_err(|e| AdStudioError::Telemetry(e.to_string()))?;
    Ok(())
}
