use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a quota check - the only value handed back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Attempts left in the current window, never negative.
    pub remaining: u32,
    /// End of the current window. Stable for every call inside one window.
    pub reset_at: DateTime<Utc>,
}

impl Decision {
    /// Whole seconds until the window ends, rounded up.
    ///
    /// Suitable for a `Retry-After` header.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            return Duration::ZERO;
        }
        Duration::from_secs((millis as u64).div_ceil(1000))
    }
}
