//! # hostrpc-logging
//!
//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] installs the global subscriber: an `EnvFilter`
//!   (honoring `RUST_LOG`) and a compact or JSON `fmt` layer on stderr
//! - [`capture_logs`] records events in memory for assertions in tests

#![deny(unsafe_code)]

pub mod capture;
pub mod types;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};
pub use types::{LogFormat, LogLevel};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init(),
    };
}
