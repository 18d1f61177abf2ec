use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single oracle call, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Zero remaining allowance; retrying cannot help.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("rate limited (retry after {retry_after:?}): {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Other(String),
}

/// Failure while downloading an item's image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("image request returned HTTP {status}")]
    Status { status: u16 },

    #[error("image request timed out")]
    Timeout,

    #[error("image request failed: {0}")]
    Network(String),
}

impl From<FetchError> for OracleError {
    fn from(e: FetchError) -> Self {
        OracleError::Transient(e.to_string())
    }
}

const RATE_SIGNALS: [&str; 5] = [
    "429",
    "quota",
    "rate limit",
    "resource_exhausted",
    "too many requests",
];

const TRANSIENT_SIGNALS: [&str; 5] = ["timeout", "timed out", "connection", "ssl", "reset"];

lazy_static! {
    static ref ZERO_LIMIT: Regex = Regex::new(r"limit:\s*0\b").expect("Failed to compile zero-limit pattern");
    static ref RETRY_DELAY: Regex = Regex::new(
        r#"(?:retry in|retry[-_]after:?|"retrydelay":\s*")\s*(\d+(?:\.\d+)?)"#
    )
    .expect("Failed to compile retry-delay pattern");
}

fn parse_retry_delay(lowered: &str) -> Option<Duration> {
    let captures = RETRY_DELAY.captures(lowered)?;
    let secs: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs(secs.ceil() as u64))
}

impl OracleError {
    /// Classifies a provider's free-text error message.
    pub fn from_message(message: impl Into<String>) -> OracleError {
        let message = message.into();
        let lowered = message.to_lowercase();

        if RATE_SIGNALS.iter().any(|s| lowered.contains(s)) {
            if ZERO_LIMIT.is_match(&lowered) {
                return OracleError::QuotaExhausted(message);
            }
            return OracleError::RateLimited {
                retry_after: parse_retry_delay(&lowered),
                message,
            };
        }
        if TRANSIENT_SIGNALS.iter().any(|s| lowered.contains(s)) {
            return OracleError::Transient(message);
        }
        OracleError::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limit_is_quota_exhausted() {
        let err = OracleError::from_message(
            "429 RESOURCE_EXHAUSTED. Quota exceeded for metric: generate_content_free_tier_requests, limit: 0",
        );
        assert!(matches!(err, OracleError::QuotaExhausted(_)));

        let compact = OracleError::from_message("quota exceeded, limit:0");
        assert!(matches!(compact, OracleError::QuotaExhausted(_)));
    }

    #[test]
    fn test_nonzero_limit_is_not_exhausted() {
        let err = OracleError::from_message("429 quota exceeded, limit: 15. Please retry in 12.3s");
        assert_eq!(
            err,
            OracleError::RateLimited {
                retry_after: Some(Duration::from_secs(13)),
                message: "429 quota exceeded, limit: 15. Please retry in 12.3s".to_string(),
            }
        );
    }

    #[test]
    fn test_retry_delay_variants() {
        let cases = [
            ("429 Too Many Requests. Please retry in 12s", 12),
            ("rate limit hit; Retry-After: 7", 7),
            ("rate limit, retry_after 4", 4),
            (r#"RESOURCE_EXHAUSTED {"retryDelay": "21s"}"#, 21),
        ];
        for (message, secs) in cases {
            match OracleError::from_message(message) {
                OracleError::RateLimited { retry_after, .. } => {
                    assert_eq!(retry_after, Some(Duration::from_secs(secs)), "{}", message)
                }
                other => panic!("unexpected classification {:?} for {}", other, message),
            }
        }
    }

    #[test]
    fn test_rate_limit_without_delay() {
        let err = OracleError::from_message("HTTP 429 Too Many Requests");
        assert!(matches!(
            err,
            OracleError::RateLimited {
                retry_after: None,
                ..
            }
        ));
    }

    #[test]
    fn test_transient_signals() {
        for message in [
            "Read timed out",
            "connection reset by peer",
            "SSL handshake failed",
            "request timeout",
        ] {
            assert!(
                matches!(OracleError::from_message(message), OracleError::Transient(_)),
                "{}",
                message
            );
        }
    }

    #[test]
    fn test_other_errors() {
        let err = OracleError::from_message("invalid image payload");
        assert_eq!(err, OracleError::Other("invalid image payload".to_string()));
    }

    #[test]
    fn test_fetch_errors_become_transient() {
        let err: OracleError = FetchError::Status { status: 404 }.into();
        assert!(matches!(err, OracleError::Transient(_)));
        let err: OracleError = FetchError::Timeout.into();
        assert!(matches!(err, OracleError::Transient(_)));
    }
}
