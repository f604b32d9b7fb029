use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source for the expiry scheduler and logging.
///
/// The book itself never reads the clock for expiry; `expire(now)` is
/// always handed a timestamp from outside.
pub struct Clock;

impl Clock {
    /// Current UTC time
    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }

    /// Get milliseconds since Unix epoch
    pub fn millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
