//! Process-level tracing setup for front ends built on complog.
//!
//! The library itself only emits `tracing` events. A CLI or service calls
//! [`init_tracing`] once at startup to install a subscriber; later calls
//! are no-ops because the global subscriber can only be set once.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise everything at `level` and above is
/// shown. With `json`, each event is one JSON line.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    install(json, filter);
}

/// Install the global subscriber with an explicit filter directive such
/// as `complog_core=debug,complog_store=info`, ignoring `RUST_LOG`.
///
/// An unparsable directive falls back to `info`.
pub fn init_tracing_with_filter(json: bool, directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    install(json, filter);
}

fn install(json: bool, filter: EnvFilter) {
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().with_target(true).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    // Already installed by an earlier call or by the host process.
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        init_tracing_with_filter(false, "complog_core=trace");
        init_tracing_with_filter(false, "[[not a filter");
    }
}
