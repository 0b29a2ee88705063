use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, the unit signal-cli uses for message
/// timestamps.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Timestamp `days` days before `now_ms`, clamped at zero.
#[must_use]
pub fn days_before(now_ms: i64, days: u32) -> i64 {
    now_ms
        .saturating_sub(i64::from(days) * 24 * 60 * 60 * 1000)
        .max(0)
}
