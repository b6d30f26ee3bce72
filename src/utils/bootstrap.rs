//! Bootstrap utilities for postdex binaries.
//!
//! Shared initialization code for the denormalizer and reindex binaries.

use std::future::Future;

use backon::Retryable;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::retry::connection_backoff;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "POSTDEX_LOG";

/// Environment variable selecting the log format (`json` or text).
pub const LOG_FORMAT_ENV: &str = "POSTDEX_LOG_FORMAT";

/// Initialize tracing with the POSTDEX_LOG environment variable.
///
/// Defaults to "info" level if POSTDEX_LOG is not set. Set
/// POSTDEX_LOG_FORMAT=json for one JSON object per line.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Connect to a backing service with exponential backoff retry.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "search index")
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connected client on success, or the last error after max retries.
pub async fn connect_with_retry<T, E, F, Fut>(service_name: &str, connect: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(connection_backoff())
        .notify(|e: &E, delay| {
            warn!(
                service = service_name,
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Failed to connect, retrying"
            );
        })
        .await;

    match &result {
        Ok(_) => info!(service = service_name, "Connected"),
        Err(e) => error!(service = service_name, error = %e, "Giving up connecting"),
    }
    result
}
