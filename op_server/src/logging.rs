//! Structured logging configuration.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset: the runtime library chats at
/// debug, noisy dependencies stay at warn.
const DEFAULT_LOG_FILTER: &str = "info,openpoker=debug,sqlx=warn,tower_http=warn";

/// Initialize tracing. The `log` records emitted inside the runtime
/// library are captured by the default `tracing-log` bridge.
pub fn init() {
    let filter = std::env::var(EnvFilter::DEFAULT_ENV)
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .compact()
        .init();
    tracing::info!(%filter, "logging initialized");
}
