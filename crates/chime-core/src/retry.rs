//! Bounded reconnect retry
//!
//! A `RetryRecord` tracks one attempt chain: the attempts that follow a
//! single explicit connect(). A `RetryPolicy` decides whether the chain may
//! continue after a failure and how long to wait before the next attempt.

use core::fmt;
use core::time::Duration;

use crate::config::RetryConfig;
use crate::errors::ChimeError;
use crate::types::Timestamp;

/// Hard cap on attempts in a single chain, regardless of configuration
pub const MAX_RETRIES: u32 = 3;

// ----------------------------------------------------------------------------
// Retry Record
// ----------------------------------------------------------------------------

/// Username and password submitted during the current attempt chain
///
/// Held in memory only so an automatic reconnect can authenticate again.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingLogin {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// State of one logical connection attempt chain
#[derive(Debug, Clone, PartialEq)]
pub struct RetryRecord {
    /// Failed attempts so far in this chain
    pub attempt: u32,
    /// Error of the most recent failed attempt
    pub last_error: Option<ChimeError>,
    /// Earliest time the next attempt may start
    pub next_allowed_at: Timestamp,
    login: Option<PendingLogin>,
}

impl RetryRecord {
    /// Start a fresh chain
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            attempt: 0,
            last_error: None,
            next_allowed_at: started_at,
            login: None,
        }
    }

    /// Count a failed attempt
    pub fn record_failure(&mut self, error: ChimeError) {
        self.attempt = self.attempt.saturating_add(1);
        self.last_error = Some(error);
    }

    /// Remember the credentials submitted in this chain
    pub fn set_login(&mut self, username: &str, password: &str) {
        self.login = Some(PendingLogin {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    /// Forget submitted credentials (after a rejection)
    pub fn forget_login(&mut self) {
        self.login = None;
    }

    pub fn login(&self) -> Option<&PendingLogin> {
        self.login.as_ref()
    }

    pub fn has_login(&self) -> bool {
        self.login.is_some()
    }
}

// ----------------------------------------------------------------------------
// Retry Policy
// ----------------------------------------------------------------------------

/// Decides whether and when a failed attempt chain continues
pub trait RetryPolicy: Send {
    /// Whether another attempt is allowed after the failures in `record`
    fn should_retry(&self, record: &RetryRecord) -> bool;

    /// Delay before the next attempt; non-decreasing in `record.attempt`
    fn next_delay(&self, record: &RetryRecord) -> Duration;
}

/// Exponential backoff capped at `MAX_RETRIES` attempts
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: RetryConfig,
}

impl BackoffPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Attempts allowed per chain
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.min(MAX_RETRIES)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy for BackoffPolicy {
    fn should_retry(&self, record: &RetryRecord) -> bool {
        record.attempt < self.max_attempts()
    }

    fn next_delay(&self, record: &RetryRecord) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64;
        let exponent = record.attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let multiplier = f64::from(self.config.backoff_multiplier.max(1.0)).powi(exponent);
        let delay_ms = (base_delay * multiplier).min(u64::MAX as f64) as u64;
        let delay = Duration::from_millis(delay_ms);

        if delay > self.config.max_delay {
            self.config.max_delay
        } else {
            delay
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_attempts(attempt: u32) -> RetryRecord {
        let mut record = RetryRecord::new(Timestamp::new(0));
        for _ in 0..attempt {
            record.record_failure(ChimeError::connection_failed("boom"));
        }
        record
    }

    #[test]
    fn test_retry_capped_at_three() {
        let policy = BackoffPolicy::new(RetryConfig {
            max_retries: 10,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts(), MAX_RETRIES);
        assert!(policy.should_retry(&record_with_attempts(1)));
        assert!(policy.should_retry(&record_with_attempts(2)));
        assert!(!policy.should_retry(&record_with_attempts(3)));
    }

    #[test]
    fn test_lower_configured_limit() {
        let policy = BackoffPolicy::new(RetryConfig {
            max_retries: 1,
            ..RetryConfig::default()
        });
        assert!(!policy.should_retry(&record_with_attempts(1)));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = BackoffPolicy::new(RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
        });
        assert_eq!(policy.next_delay(&record_with_attempts(1)), Duration::from_millis(100));
        assert_eq!(policy.next_delay(&record_with_attempts(2)), Duration::from_millis(200));
        // Capped at max_delay
        assert_eq!(policy.next_delay(&record_with_attempts(3)), Duration::from_millis(300));
    }

    #[test]
    fn test_immediate_retry_has_no_delay() {
        let policy = BackoffPolicy::new(RetryConfig::immediate());
        assert_eq!(policy.next_delay(&record_with_attempts(2)), Duration::ZERO);
    }

    #[test]
    fn test_record_tracks_failures_and_login() {
        let mut record = RetryRecord::new(Timestamp::new(5));
        assert_eq!(record.attempt, 0);
        assert!(!record.has_login());

        record.set_login("alice", "pw");
        record.record_failure(ChimeError::connection_failed("reset"));
        assert_eq!(record.attempt, 1);
        assert_eq!(
            record.last_error,
            Some(ChimeError::connection_failed("reset"))
        );
        assert_eq!(record.login().map(|l| l.username.as_str()), Some("alice"));

        let debug = format!("{:?}", record);
        assert!(!debug.contains("pw\""));
        assert!(debug.contains("<redacted>"));

        record.forget_login();
        assert!(!record.has_login());
    }
}
