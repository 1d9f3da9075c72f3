use chrono::{DateTime, Utc};

use super::{Decision, Policy};

/// Per-identifier counter state for one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    pub count: u32,
    pub window_reset_at: DateTime<Utc>,
}

impl CounterRecord {
    /// Record for the first attempt of a new window starting at `now`.
    pub fn fresh(now: DateTime<Utc>, policy: &Policy) -> Self {
        Self {
            count: 1,
            window_reset_at: now
                .checked_add_signed(policy.window_delta())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// A record is expired once `now` reaches the end of its window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_reset_at
    }

    /// Decision reporting the state of this record under `policy`.
    pub fn decision(&self, policy: &Policy, allowed: bool) -> Decision {
        Decision {
            allowed,
            remaining: policy.remaining_after(u64::from(self.count)),
            reset_at: self.window_reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_fresh_record_spans_one_window() {
        let now = Utc::now();
        let record = CounterRecord::fresh(now, &Policy::default());
        assert_eq!(record.count, 1);
        assert_eq!(record.window_reset_at, now + TimeDelta::minutes(15));
    }

    #[test]
    fn test_expiry_is_inclusive_of_reset_instant() {
        let now = Utc::now();
        let record = CounterRecord::fresh(now, &Policy::default());
        assert!(!record.is_expired(now + TimeDelta::minutes(15) - TimeDelta::milliseconds(1)));
        assert!(record.is_expired(now + TimeDelta::minutes(15)));
    }
}
