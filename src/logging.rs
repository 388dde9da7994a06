//! # Structured Logging
//!
//! Environment-aware tracing setup. Console output is always enabled; JSON
//! output can be requested for log shippers via `DTE_RELAY_LOG_FORMAT=json`.

use std::env;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging. Safe to call more than once; only the
/// first call installs a subscriber, and an already-installed global
/// subscriber (e.g. from a host application) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| default_log_level());
        let json_output = env::var("DTE_RELAY_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json_output {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_filter(EnvFilter::new(filter)),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(EnvFilter::new(filter)),
                )
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }
    });
}

fn default_log_level() -> String {
    match env::var("DTE_RELAY_ENV").as_deref() {
        Ok("production") => "info".to_string(),
        _ => "debug".to_string(),
    }
}
