//! Accept-error backoff with jitter.
//!
//! Repeated accept failures (fd exhaustion, ENOBUFS) would otherwise spin the
//! acceptor loop. Each consecutive failure doubles the pause up to a cap.

use std::time::Duration;

use rand::Rng;

/// Pause after the first failed accept.
pub const ACCEPT_BACKOFF_BASE_MS: u64 = 5;

/// Longest pause between accept attempts.
pub const ACCEPT_BACKOFF_MAX_MS: u64 = 1000;

/// Pause before the next accept after `failures` consecutive errors.
pub fn accept_backoff(failures: u32) -> Duration {
    calculate_backoff(failures, ACCEPT_BACKOFF_BASE_MS, ACCEPT_BACKOFF_MAX_MS)
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
