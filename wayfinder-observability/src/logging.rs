use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. Honors `RUST_LOG` when set;
/// otherwise falls back to `default_level`. `json` switches the formatter to
/// newline-delimited JSON for log-aggregator ingestion; plain text otherwise.
///
/// Safe to call more than once per process (e.g. across test binaries) — a
/// failed re-install is swallowed rather than panicking.
pub fn init(json: bool, default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let subscriber = fmt().with_env_filter(filter).with_target(false);
    let result = if json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed, skipping re-init");
    }
}
