//! Retry utilities: backoff builders for orchestration-level retries.
//!
//! The pipeline core never retries on its own. These builders are used by
//! the reindexer and by binaries waiting for backing services at startup.

use std::time::Duration;

use backon::{ConstantBuilder, ExponentialBuilder};

/// Delay between reindex attempts.
pub const SEED_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retries after the first reindex attempt.
pub const SEED_MAX_RETRIES: usize = 3;

/// Fixed-delay backoff for bulk seeding/reindexing.
///
/// - Delay: 1s
/// - Max retries: 3
pub fn seed_backoff() -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(SEED_RETRY_DELAY)
        .with_max_times(SEED_MAX_RETRIES)
}

/// Backoff for connecting to backing services at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
