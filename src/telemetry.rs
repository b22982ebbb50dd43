// src/telemetry.rs
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. Filter from `RUST_LOG`, else `LOG_LEVEL`
/// (e.g. `DEBUG`), else `info`. `LOG_FORMAT=json` emits JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if installed.is_err() {
        // already set (tests, embedding app); keep the existing one
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Handles passed to each component so their events carry a stable target.
pub struct Spans {
    pub store: Span,
    pub feeds: Span,
    pub notifier: Span,
    pub monitor: Span,
}

impl Spans {
    pub fn new() -> Self {
        Self {
            store: tracing::info_span!("store"),
            feeds: tracing::info_span!("feeds"),
            notifier: tracing::info_span!("discord"),
            monitor: tracing::info_span!("monitor"),
        }
    }
}

impl Default for Spans {
    fn default() -> Self {
        Self::new()
    }
}
