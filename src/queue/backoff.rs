use chrono::{DateTime, Duration, Utc};

use crate::config::QueueOptions;

/// Longest delay a record can be deferred by: 365 days.
pub const MAX_DELAY_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Delay in ms before a record that just failed becomes eligible again.
///
/// `retry_count` is the count before this failure. When the failure uses up
/// the last retry the delay is zero, so the record reaches the failure hook
/// on the next batch without waiting.
pub fn delay_ms(retry_count: i32, options: &QueueOptions) -> i64 {
    if options.has_retry_limit() && retry_count.saturating_add(1) >= options.retry_limit {
        return 0;
    }

    let attempts = f64::from(retry_count.max(0)) + 1.0;
    let delay = (options.backoff_ms as f64 * attempts.powf(options.backoff_coefficient)).round();
    delay.clamp(0.0, MAX_DELAY_MS as f64) as i64
}

/// `now + delay_ms`, with the delay clamped to `0..=MAX_DELAY_MS`.
pub fn available_after(now: DateTime<Utc>, delay_ms: i64) -> DateTime<Utc> {
    let delay = Duration::milliseconds(delay_ms.clamp(0, MAX_DELAY_MS));
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
