use std::time::Duration;

use chrono::TimeDelta;

use crate::error::PolicyError;

/// Default attempts per window (login protection).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default window length (login protection).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Quota policy - how many attempts are allowed per fixed window.
///
/// Fields are private: a `Policy` that exists is always valid, so quota
/// checks themselves never fail on bad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    max_attempts: u32,
    window: Duration,
    window_delta: TimeDelta,
}

impl Policy {
    /// Build a policy, rejecting zero attempts or an empty window.
    pub fn new(max_attempts: u32, window: Duration) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        let window_delta =
            TimeDelta::from_std(window).map_err(|_| PolicyError::WindowOutOfRange(window))?;

        Ok(Self {
            max_attempts,
            window,
            window_delta,
        })
    }

    /// Login protection: 5 attempts per 15 minutes.
    pub fn login() -> Self {
        Self::default()
    }

    /// `max_attempts` per minute, as used for AI chat turns.
    pub fn per_minute(max_attempts: u32) -> Result<Self, PolicyError> {
        Self::new(max_attempts, Duration::from_secs(60))
    }

    /// Code execution runs: 20 per minute.
    pub fn sandbox() -> Self {
        Self {
            max_attempts: 20,
            window: Duration::from_secs(60),
            window_delta: TimeDelta::seconds(60),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The window as a signed delta for timestamp arithmetic.
    pub fn window_delta(&self) -> TimeDelta {
        self.window_delta
    }

    /// Attempts left after `count` attempts, clamped at zero.
    pub fn remaining_after(&self, count: u64) -> u32 {
        u64::from(self.max_attempts)
            .saturating_sub(count)
            .try_into()
            .unwrap_or(0)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            window: DEFAULT_WINDOW,
            window_delta: TimeDelta::seconds(DEFAULT_WINDOW.as_secs() as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_login_protection() {
        let policy = Policy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.window(), Duration::from_secs(900));
        assert_eq!(policy.window_delta(), TimeDelta::minutes(15));
        assert_eq!(Policy::login(), policy);
    }

    #[test]
    fn test_presets_match_constructor() {
        assert_eq!(
            Policy::sandbox(),
            Policy::new(20, Duration::from_secs(60)).unwrap()
        );
        assert_eq!(
            Policy::per_minute(30).unwrap(),
            Policy::new(30, Duration::from_secs(60)).unwrap()
        );
    }

    #[test]
    fn test_rejects_invalid_policies() {
        assert_eq!(
            Policy::new(0, Duration::from_secs(1)),
            Err(PolicyError::ZeroAttempts)
        );
        assert_eq!(Policy::new(3, Duration::ZERO), Err(PolicyError::ZeroWindow));
        assert_eq!(Policy::per_minute(0), Err(PolicyError::ZeroAttempts));
        assert!(matches!(
            Policy::new(3, Duration::MAX),
            Err(PolicyError::WindowOutOfRange(_))
        ));
    }

    #[test]
    fn test_remaining_is_clamped() {
        let policy = Policy::default();
        assert_eq!(policy.remaining_after(1), 4);
        assert_eq!(policy.remaining_after(5), 0);
        assert_eq!(policy.remaining_after(500), 0);
    }
}
