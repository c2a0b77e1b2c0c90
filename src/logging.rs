//! Tracing subscriber setup.
//!
//! Drivers log through `tracing` macros; this module installs the global
//! subscriber from the application config. `RUST_LOG`, when set, takes
//! precedence over `log_level`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ApplicationConfig, LogFormat};

/// Build the level filter for `config`.
pub fn env_filter(config: &ApplicationConfig) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| anyhow!("Invalid {}: {}", EnvFilter::DEFAULT_ENV, e)),
        _ => EnvFilter::try_new(&config.log_level)
            .map_err(|e| anyhow!("Invalid log_level '{}': {}", config.log_level, e)),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &ApplicationConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?,
    }

    tracing::info!(
        "Logging initialised for '{}' at level {}",
        config.name,
        config.log_level
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn app(level: &str) -> ApplicationConfig {
        ApplicationConfig {
            name: "bench".to_string(),
            log_level: level.to_string(),
            log_format: LogFormat::Pretty,
        }
    }

    #[test]
    #[serial]
    fn test_filter_from_config_level() {
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        let filter = env_filter(&app("debug")).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    #[serial]
    fn test_rust_log_takes_precedence() {
        std::env::set_var(EnvFilter::DEFAULT_ENV, "rust_daq_drivers=trace");
        let filter = env_filter(&app("warn"));
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        assert_eq!(filter.unwrap().to_string(), "rust_daq_drivers=trace");
    }
}
