//! Core types for the Chime session core
//!
//! Millisecond timestamps and the clock abstraction used by the session
//! manager for attempt deadlines and retry scheduling.

use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Timestamp in milliseconds since UNIX epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp from milliseconds
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current timestamp from the system clock
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self(millis)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Timestamp offset forward by a duration
    pub fn add_duration(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps
///
/// The session manager never reads the system clock directly so that
/// timeouts and backoff can be driven deterministically in tests.
pub trait TimeSource: Send {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Box<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub use mock::MockTimeSource;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::{TimeSource, Timestamp};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Mock time source for deterministic testing
    ///
    /// Clones share the same clock, so a test can keep one handle and
    /// advance the time seen by a manager that owns another.
    #[derive(Debug, Clone, Default)]
    pub struct MockTimeSource {
        current_time: Arc<AtomicU64>,
    }

    impl MockTimeSource {
        /// Create a new mock time source starting at time 0
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a new mock time source starting at a specific time
        pub fn new_at(start_time: u64) -> Self {
            Self {
                current_time: Arc::new(AtomicU64::new(start_time)),
            }
        }

        /// Advance time by the specified number of milliseconds
        pub fn advance(&self, millis: u64) {
            self.current_time.fetch_add(millis, Ordering::SeqCst);
        }

        /// Set the time to a specific value
        pub fn set_time(&self, millis: u64) {
            self.current_time.store(millis, Ordering::SeqCst);
        }
    }

    impl TimeSource for MockTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.current_time.load(Ordering::SeqCst))
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let start = Timestamp::new(1_000);
        let later = start.add_duration(Duration::from_millis(250));
        assert_eq!(later.as_millis(), 1_250);
        assert_eq!(later.duration_since(start), Duration::from_millis(250));
        assert_eq!(start.duration_since(later), Duration::ZERO);
    }

    #[test]
    fn test_mock_time_source_shared_between_clones() {
        let clock = MockTimeSource::new_at(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now().as_millis(), 15);
        other.set_time(100);
        assert_eq!(clock.now(), Timestamp::new(100));
    }
}
