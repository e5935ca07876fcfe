//! Logging subscriber initialisation.

use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, Registry,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::settings::{LogFormat, LoggingSettings};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Failed to initialise tracing subscriber.
    #[error("failed to initialise tracing subscriber: {0}")]
    TracingSubscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns [`LoggingError`] if a global subscriber is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    match settings.format {
        LogFormat::Compact => init_with_layer(
            settings,
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        ),
        LogFormat::Json => init_with_layer(
            settings,
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true),
        ),
    }
}

fn fallback_directive(settings: &LoggingSettings) -> String {
    format!("{},lattice_checkout={}", settings.level, settings.level)
}

fn build_env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_directive(settings)))
}

fn init_with_layer<L>(settings: &LoggingSettings, fmt_layer: L) -> Result<(), LoggingError>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(build_env_filter(settings))
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_uses_configured_level() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            format: LogFormat::Json,
        };

        assert_eq!(fallback_directive(&settings), "debug,lattice_checkout=debug");
    }

    #[test]
    fn second_initialisation_fails() {
        let settings = LoggingSettings::default();

        // Another test may have installed the subscriber first.
        let _first = init_logging(&settings);

        assert!(init_logging(&settings).is_err());
    }
}
