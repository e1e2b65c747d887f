//! Tracing subscriber setup.

use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Build the log filter. A non-empty `RUST_LOG` wins over the configured level.
///
/// # Errors
///
/// Returns `ParseError` if the chosen directive is not a valid filter.
pub fn build_filter(level: &str, rust_log: Option<&str>) -> Result<EnvFilter, ParseError> {
    let directive = rust_log
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(level);
    EnvFilter::try_new(directive)
}

/// Install the global subscriber. Call once, before anything logs.
///
/// # Errors
///
/// Returns `ParseError` if the level or `RUST_LOG` directive is invalid.
pub fn init(config: &LoggingConfig) -> Result<(), ParseError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(&config.level, rust_log.as_deref())?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }

    Ok(())
}
