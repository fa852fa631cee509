use tracing_subscriber::{fmt, EnvFilter};

/// Directives used when `RUST_LOG` is unset: the sync crates at debug, the
/// WebSocket stack quiet.
const DEFAULT_DIRECTIVES: &str =
    "info,sync_client=debug,realtime_link=debug,resource_cache=debug,tungstenite=warn,tokio_tungstenite=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Human-readable output. Does nothing if a global subscriber is already set,
/// so embedding applications keep their own.
pub fn init_tracing() {
    if fmt().with_env_filter(env_filter()).with_target(false).try_init().is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}

/// JSON output for log shipping; same filter as [`init_tracing`]
pub fn init_json_tracing() {
    if fmt().json().with_env_filter(env_filter()).try_init().is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}
