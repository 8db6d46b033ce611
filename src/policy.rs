//! Retry policy configuration and checked delay computation
//!
//! A `RetryPolicy` is an immutable value: construction validates the bounds
//! contract, after which the policy can be cloned and shared across
//! concurrent executions freely.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Construction-time contract violations for [`RetryPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidPolicy {
    /// `max_attempts` must allow at least one attempt
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// The backoff multiplier may not shrink the delay
    #[error("backoff_multiplier must be at least 1.0, got {0}")]
    MultiplierTooSmall(f64),

    /// NaN or infinite multipliers would poison the delay arithmetic
    #[error("backoff_multiplier must be finite, got {0}")]
    MultiplierNotFinite(f64),
}

/// Delay growth left the representable range and no cap was configured
///
/// Returned by [`RetryPolicy::delay_after`] when the geometric progression
/// exceeds what a [`Duration`] can hold. Policies with a
/// [`max_delay`](RetryPolicy::max_delay) cap never produce this: the delay
/// clamps instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("backoff delay after attempt {attempt} exceeds the representable bound")]
pub struct PolicyOverflow {
    /// The attempt whose follow-up delay overflowed
    pub attempt: u32,
}

/// Configuration for retry behavior
///
/// The delay scheduled after attempt `n` (1-based, `n < max_attempts`) is
/// `initial_delay * backoff_multiplier^(n-1)`, optionally clamped to
/// `max_delay`. No jitter is applied; callers wanting jitter perturb the
/// policy they construct.
///
/// Serializes through a millisecond-based representation so policies can be
/// loaded from config files; deserialization re-runs the validation
/// contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Some(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    /// Create a validated policy
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPolicy`] if `max_attempts < 1` or the multiplier is
    /// below `1.0` or not finite.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, InvalidPolicy> {
        if max_attempts < 1 {
            return Err(InvalidPolicy::ZeroAttempts);
        }
        if !backoff_multiplier.is_finite() {
            return Err(InvalidPolicy::MultiplierNotFinite(backoff_multiplier));
        }
        if backoff_multiplier < 1.0 {
            return Err(InvalidPolicy::MultiplierTooSmall(backoff_multiplier));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay: None,
        })
    }

    /// Clamp all computed delays to `cap`
    ///
    /// A capped policy can never overflow; growth saturates at the cap.
    pub fn with_max_delay(mut self, cap: Duration) -> Self {
        self.max_delay = Some(cap);
        self
    }

    /// Maximum number of attempts (at least 1)
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay scheduled before the second attempt
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Factor by which the delay grows after each retryable failure
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Optional upper bound on computed delays
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Compute the delay scheduled after a failed attempt (1-based)
    ///
    /// # Errors
    ///
    /// Returns [`PolicyOverflow`] when the uncapped progression exceeds the
    /// representable duration range.
    pub fn delay_after(&self, attempt: u32) -> Result<Duration, PolicyOverflow> {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        match Duration::try_from_secs_f64(scaled) {
            Ok(delay) => Ok(match self.max_delay {
                Some(cap) => delay.min(cap),
                None => delay,
            }),
            // try_from_secs_f64 rejects non-finite and out-of-range values;
            // the inputs are validated non-negative, so this is growth past
            // the representable bound.
            Err(_) => match self.max_delay {
                Some(cap) => Ok(cap),
                None => Err(PolicyOverflow { attempt }),
            },
        }
    }
}

/// Millisecond-based wire form for config files
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPolicy {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    initial_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    backoff_multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    100
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> Option<u64> {
    Some(30_000)
}

impl TryFrom<RawPolicy> for RetryPolicy {
    type Error = InvalidPolicy;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let policy = RetryPolicy::new(
            raw.max_attempts,
            Duration::from_millis(raw.initial_delay_ms),
            raw.backoff_multiplier,
        )?;
        Ok(match raw.max_delay_ms {
            Some(ms) => policy.with_max_delay(Duration::from_millis(ms)),
            None => policy,
        })
    }
}

impl From<RetryPolicy> for RawPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            max_delay_ms: policy.max_delay.map(|d| d.as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_attempts() {
        let result = RetryPolicy::new(0, Duration::from_millis(100), 2.0);
        assert_eq!(result.unwrap_err(), InvalidPolicy::ZeroAttempts);
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let result = RetryPolicy::new(3, Duration::from_millis(100), 0.5);
        assert!(matches!(
            result.unwrap_err(),
            InvalidPolicy::MultiplierTooSmall(_)
        ));
    }

    #[test]
    fn rejects_non_finite_multiplier() {
        for m in [f64::NAN, f64::INFINITY] {
            let result = RetryPolicy::new(3, Duration::from_millis(100), m);
            assert!(matches!(
                result.unwrap_err(),
                InvalidPolicy::MultiplierNotFinite(_)
            ));
        }
    }

    #[test]
    fn single_attempt_is_valid() {
        let policy = RetryPolicy::new(1, Duration::ZERO, 1.0).unwrap();
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn delay_sequence_is_geometric() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0).unwrap();

        assert_eq!(policy.delay_after(1).unwrap(), Duration::from_millis(100)); // 100 * 2^0
        assert_eq!(policy.delay_after(2).unwrap(), Duration::from_millis(200)); // 100 * 2^1
        assert_eq!(policy.delay_after(3).unwrap(), Duration::from_millis(400)); // 100 * 2^2
        assert_eq!(policy.delay_after(4).unwrap(), Duration::from_millis(800)); // 100 * 2^3
    }

    #[test]
    fn multiplier_one_gives_fixed_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(500), 1.0).unwrap();

        for attempt in 1..=4 {
            assert_eq!(
                policy.delay_after(attempt).unwrap(),
                Duration::from_millis(500)
            );
        }
    }

    #[test]
    fn custom_multiplier() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100), 3.0).unwrap();

        assert_eq!(policy.delay_after(1).unwrap(), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2).unwrap(), Duration::from_millis(300));
        assert_eq!(policy.delay_after(3).unwrap(), Duration::from_millis(900));
    }

    #[test]
    fn max_delay_caps_growth() {
        let policy = RetryPolicy::new(10, Duration::from_secs(10), 10.0)
            .unwrap()
            .with_max_delay(Duration::from_secs(5));

        for attempt in 1..=9 {
            assert_eq!(policy.delay_after(attempt).unwrap(), Duration::from_secs(5));
        }
    }

    #[test]
    fn uncapped_growth_overflows() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1e30).unwrap();

        assert_eq!(policy.delay_after(1).unwrap(), Duration::from_millis(1));
        assert_eq!(policy.delay_after(2).unwrap_err(), PolicyOverflow { attempt: 2 });
    }

    #[test]
    fn capped_growth_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 1e30)
            .unwrap()
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_after(2).unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn deserialization_validates() {
        let err = serde_json::from_str::<RetryPolicy>(r#"{"max_attempts": 0}"#).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));

        let err = serde_json::from_str::<RetryPolicy>(r#"{"backoff_multiplier": 0.1}"#)
            .unwrap_err();
        assert!(err.to_string().contains("backoff_multiplier"));
    }

    #[test]
    fn deserialization_applies_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.initial_delay(), Duration::from_millis(100));
        assert_eq!(policy.max_delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn serde_round_trip() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250), 1.5)
            .unwrap()
            .with_max_delay(Duration::from_secs(60));

        let json = serde_json::to_string(&policy).unwrap();
        let back: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, back);
    }
}
