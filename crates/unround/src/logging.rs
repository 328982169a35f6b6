#![forbid(unsafe_code)]

//! Global `tracing` subscriber bootstrap.
//!
//! `RUST_LOG` wins when set; otherwise [`DEFAULT_FILTER`] applies. With the
//! `tracing-json` feature, events are written as JSON lines.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,unround=info,unround_runtime=info";

/// Errors installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("global subscriber already installed: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber using `RUST_LOG` or [`DEFAULT_FILTER`].
pub fn init() -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// Install the global subscriber with explicit filter directives.
pub fn init_with_filter(directives: &str) -> Result<(), LoggingError> {
    install(EnvFilter::try_new(directives)?)
}

#[cfg(feature = "tracing-json")]
fn install(filter: EnvFilter) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()?;
    Ok(())
}

#[cfg(not(feature = "tracing-json"))]
fn install(filter: EnvFilter) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
