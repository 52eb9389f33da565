//! Wall-clock source for credential timestamps and request ids.

use time::OffsetDateTime;

/// Supplies the current Unix time in milliseconds.
///
/// The messaging core never caches a reading: every connect attempt and every
/// drained property asks the clock again.
pub trait Clock: Send + Sync {
    fn timestamp_millis(&self) -> u64;
}

/// Reads the system clock (UTC).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp_millis(&self) -> u64 {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        u64::try_from(millis).unwrap_or(0)
    }
}
