//! Logging setup using `tracing` + `tracing-subscriber`
//!
//! `RUST_LOG` takes priority, then `--log-level`, then `[log] level` from the
//! config file. Events go to stderr so forwarded command output on stdout is
//! left alone.

use tracing_subscriber::EnvFilter;

/// Initialise the global subscriber. Call once at startup.
pub fn init(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
