//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for structured logging. The configured level
//! applies to the engine, `RUST_LOG` overrides it, and the output format is
//! pretty in debug builds and JSON in release builds.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive for a configured level.
///
/// Dependencies (sqlx, reqwest, hyper) are held at `warn` so request logs do
/// not drown evaluation events.
pub fn filter_directive(log_level: &str) -> String {
    format!(
        "warn,lexis_engine={lvl},lexis={lvl},sdk={lvl}",
        lvl = log_level
    )
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter > default "info"
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    // Logs go to stderr so `--json` output on stdout stays machine readable
    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

/// Initialize the tracing subscriber at "info" when no config is loaded yet.
pub fn init_telemetry() {
    init_telemetry_with_level("info");
}
