//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::config::RetryConfig;

/// Backoff for transient blob upload failures.
///
/// Defaults: 50ms to 1s, 3 retries, jitter enabled. The redemption upload
/// timeout bounds the whole sequence regardless of these settings.
pub fn upload_backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms.max(config.min_delay_ms)))
        .with_max_times(config.max_times)
        .with_jitter()
}

/// Backoff for the reconciler's refund writes.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 5
/// - Jitter enabled
pub fn reconciliation_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(5)
        .with_jitter()
}
