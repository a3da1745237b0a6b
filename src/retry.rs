// =============================================================================
// Centralized retry/backoff — one policy, many call sites
// =============================================================================
//
// Every component that talks to an external system (exchange adapter, market
// data provider) drives its reconnect/retry loop through this module rather
// than hand-rolling its own sleep-and-loop. Call sites supply only a
// classifier closure that turns their error type into an [`crate::errors::ErrorKind`].
// =============================================================================

use std::time::Duration;
use tracing::warn;

use crate::errors::ErrorKind;

/// Parameters for an exponential backoff schedule with a hard ceiling.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// The schedule used by market-data reconnects and the engine supervisor's
    /// worker restarts: 5s base, 5 minute cap.
    pub const STANDARD: BackoffPolicy = BackoffPolicy {
        base: Duration::from_secs(5),
        cap: Duration::from_secs(300),
        max_attempts: 10,
    };

    /// The schedule used by market-data stream reconnects specifically, which
    /// are capped at 10 attempts per session per the external interface
    /// contract before the provider reports itself unhealthy.
    pub const MARKET_DATA: BackoffPolicy = BackoffPolicy {
        base: Duration::from_secs(5),
        cap: Duration::from_secs(300),
        max_attempts: 10,
    };

    /// Delay before the `attempt`'th retry (1-indexed), clamped to `cap`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        let scaled = self.base.saturating_mul(1u32 << exp);
        scaled.min(self.cap)
    }
}

/// Decide how long to wait before retrying, given a classified error and how
/// many attempts have already been made. Returns `None` when the error is
/// not retryable or the attempt budget is exhausted.
pub fn next_delay(policy: &BackoffPolicy, kind: ErrorKind, attempt: u32) -> Option<Duration> {
    if !kind.is_retryable() {
        return None;
    }
    if attempt >= policy.max_attempts {
        warn!(attempts = attempt, "retry budget exhausted");
        return None;
    }
    let scheduled = policy.delay_for_attempt(attempt);
    Some(scheduled.max(kind.min_retry_delay()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_then_caps() {
        let p = BackoffPolicy::STANDARD;
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(20));
        // 5 * 2^5 = 160s, still under the 300s cap.
        assert_eq!(p.delay_for_attempt(6), Duration::from_secs(160));
        // Further attempts clamp at cap, not continuing to grow unbounded.
        assert_eq!(p.delay_for_attempt(20), Duration::from_secs(300));
    }

    #[test]
    fn non_retryable_kind_returns_none() {
        let p = BackoffPolicy::STANDARD;
        assert!(next_delay(&p, ErrorKind::Authentication, 1).is_none());
    }

    #[test]
    fn exhausted_attempts_returns_none() {
        let p = BackoffPolicy::STANDARD;
        assert!(next_delay(&p, ErrorKind::Network, p.max_attempts).is_none());
    }

    #[test]
    fn rate_limit_floor_applies_even_on_first_attempt() {
        let p = BackoffPolicy::STANDARD;
        let d = next_delay(&p, ErrorKind::RateLimit, 1).unwrap();
        assert!(d >= Duration::from_secs(60));
    }
}
