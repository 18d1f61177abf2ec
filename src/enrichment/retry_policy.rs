//! Retry policy for oracle calls.
//!
//! Server-specified delays are honoured with a small safety buffer; rate
//! limits without a delay back off by a base interval times the attempt
//! number, everything else by a shorter linear step.

use super::error::OracleError;
use crate::config::EnrichmentSettings;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again.
    RetryAfter(Duration),
    /// The failure cannot be retried (zero quota left).
    Abort,
    /// The attempt budget is spent.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per item, including the first.
    pub max_attempts: u32,
    /// Added to a server-specified retry delay.
    pub rate_limit_buffer: Duration,
    /// Multiplied by the attempt number when a rate limit names no delay.
    pub rate_limit_base: Duration,
    /// Multiplied by the attempt number for any other failure.
    pub transient_base: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &EnrichmentSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            rate_limit_buffer: Duration::from_secs(settings.rate_limit_buffer_secs),
            rate_limit_base: Duration::from_secs(settings.rate_limit_base_secs),
            transient_base: Duration::from_secs(settings.transient_backoff_secs),
        }
    }

    /// Decides the follow-up to `error` on the zero-based `attempt`.
    pub fn decide(&self, error: &OracleError, attempt: u32) -> RetryDecision {
        if matches!(error, OracleError::QuotaExhausted(_)) {
            return RetryDecision::Abort;
        }
        if attempt + 1 >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.backoff(error, attempt))
    }

    /// Delay before the attempt following zero-based `attempt`.
    pub fn backoff(&self, error: &OracleError, attempt: u32) -> Duration {
        let step = attempt + 1;
        match error {
            OracleError::RateLimited {
                retry_after: Some(delay),
                ..
            } => *delay + self.rate_limit_buffer,
            OracleError::RateLimited {
                retry_after: None, ..
            } => self.rate_limit_base * step,
            OracleError::QuotaExhausted(_) | OracleError::Transient(_) | OracleError::Other(_) => {
                self.transient_base * step
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_buffer: Duration::from_secs(5),
            rate_limit_base: Duration::from_secs(30),
            transient_base: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited(secs: Option<u64>) -> OracleError {
        OracleError::RateLimited {
            retry_after: secs.map(Duration::from_secs),
            message: "429".to_string(),
        }
    }

    #[test]
    fn test_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.rate_limit_buffer, Duration::from_secs(5));
        assert_eq!(policy.rate_limit_base, Duration::from_secs(30));
        assert_eq!(policy.transient_base, Duration::from_secs(3));
    }

    #[test]
    fn test_new_from_settings() {
        let settings = EnrichmentSettings {
            max_attempts: 5,
            rate_limit_buffer_secs: 2,
            rate_limit_base_secs: 10,
            transient_backoff_secs: 1,
            ..EnrichmentSettings::default()
        };
        let policy = RetryPolicy::new(&settings);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.rate_limit_buffer, Duration::from_secs(2));
        assert_eq!(policy.rate_limit_base, Duration::from_secs(10));
        assert_eq!(policy.transient_base, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let settings = EnrichmentSettings {
            max_attempts: 0,
            ..EnrichmentSettings::default()
        };
        assert_eq!(RetryPolicy::new(&settings).max_attempts, 1);
    }

    #[test]
    fn test_quota_exhausted_aborts_immediately() {
        let policy = RetryPolicy::default();
        let err = OracleError::QuotaExhausted("limit: 0".to_string());
        assert_eq!(policy.decide(&err, 0), RetryDecision::Abort);
        assert_eq!(policy.decide(&err, 2), RetryDecision::Abort);
    }

    #[test]
    fn test_server_delay_plus_buffer() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&rate_limited(Some(12)), 0),
            RetryDecision::RetryAfter(Duration::from_secs(17))
        );
        assert_eq!(
            policy.decide(&rate_limited(Some(12)), 1),
            RetryDecision::RetryAfter(Duration::from_secs(17))
        );
    }

    #[test]
    fn test_rate_limit_without_delay_scales_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(&rate_limited(None), 0), Duration::from_secs(30));
        assert_eq!(policy.backoff(&rate_limited(None), 1), Duration::from_secs(60));
    }

    #[test]
    fn test_transient_and_other_backoff_linearly() {
        let policy = RetryPolicy::default();
        let transient = OracleError::Transient("timed out".to_string());
        let other = OracleError::Other("bad payload".to_string());
        assert_eq!(policy.backoff(&transient, 0), Duration::from_secs(3));
        assert_eq!(policy.backoff(&transient, 1), Duration::from_secs(6));
        assert_eq!(policy.backoff(&other, 0), Duration::from_secs(3));
        assert_eq!(policy.backoff(&other, 1), Duration::from_secs(6));
    }

    #[test]
    fn test_last_attempt_is_exhausted() {
        let policy = RetryPolicy::default();
        let err = OracleError::Other("boom".to_string());
        assert!(matches!(policy.decide(&err, 0), RetryDecision::RetryAfter(_)));
        assert!(matches!(policy.decide(&err, 1), RetryDecision::RetryAfter(_)));
        assert_eq!(policy.decide(&err, 2), RetryDecision::Exhausted);
    }
}
