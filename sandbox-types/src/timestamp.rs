//! Millisecond wall-clock helpers.
//!
//! Record `mtime`s are plain milliseconds since the Unix epoch. Retention is
//! measured in whole days against the same clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one retention day.
pub const MILLIS_PER_DAY: u64 = 86_400_000;

/// Returns the current wall time in milliseconds since the Unix epoch.
///
/// Never returns 0, so a freshly stamped record always has a positive `mtime`.
#[must_use]
pub fn now_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    millis.max(1)
}

/// Converts whole days to milliseconds, saturating on overflow.
#[must_use]
pub const fn days_to_ms(days: u32) -> u64 {
    (days as u64).saturating_mul(MILLIS_PER_DAY)
}

/// Returns true if a record last modified at `mtime` is strictly older than
/// `threshold_days` as of `now`.
#[must_use]
pub const fn is_expired(mtime: u64, now: u64, threshold_days: u32) -> bool {
    now.saturating_sub(mtime) > days_to_ms(threshold_days)
}
