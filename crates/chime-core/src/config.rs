//! Centralized Configuration Management
//!
//! This module consolidates all configuration structures used by the session
//! core: attempt timeouts, retry/backoff behaviour and channel sizing.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::retry::MAX_RETRIES;

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Configuration for channel buffer sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for the Transport → Dispatcher event channel
    pub transport_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transport_event_buffer_size: 128, // roster sync arrives in bursts
        }
    }
}

// ----------------------------------------------------------------------------
// Retry Configuration
// ----------------------------------------------------------------------------

/// Configuration for reconnect retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts in one chain (capped at `MAX_RETRIES`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum retry delay (for exponential backoff)
    pub max_delay: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry without any delay between attempts
    pub fn immediate() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create configuration for conservative retry behavior
    pub fn conservative() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 3.0,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration for session timeouts and observability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum time spent in `Connecting` before the attempt fails
    pub connect_timeout: Duration,
    /// Maximum time spent in `Authenticating` before the attempt fails
    pub authenticate_timeout: Duration,
    /// Number of transition records kept in the audit trail
    pub audit_trail_size: usize,
    /// Capacity of the session update broadcast channel
    pub update_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            authenticate_timeout: Duration::from_secs(60),
            audit_trail_size: 256,
            update_buffer_size: 64,
        }
    }
}

impl SessionConfig {
    /// Short timeouts for tests and scripted replays
    pub fn low_latency() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            authenticate_timeout: Duration::from_millis(500),
            audit_trail_size: 64,
            update_buffer_size: 64,
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the session core
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeConfig {
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub channels: ChannelConfig,
}

impl ChimeConfig {
    /// Builder method for customizing session configuration
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Builder method for customizing retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method for customizing channel configuration
    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.channels.transport_event_buffer_size == 0 {
            return Err("Transport event buffer size cannot be zero".into());
        }

        if self.retry.max_retries == 0 {
            return Err("Max retries cannot be zero".into());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be at least 1.0".into());
        }
        if self.retry.initial_delay > self.retry.max_delay {
            return Err("Initial retry delay cannot be greater than max retry delay".into());
        }

        if self.session.connect_timeout.is_zero() {
            return Err("Connect timeout cannot be zero".into());
        }
        if self.session.authenticate_timeout.is_zero() {
            return Err("Authenticate timeout cannot be zero".into());
        }
        if self.session.audit_trail_size == 0 {
            return Err("Audit trail size cannot be zero".into());
        }
        if self.session.update_buffer_size == 0 {
            return Err("Update buffer size cannot be zero".into());
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Configuration Presets
// ----------------------------------------------------------------------------

/// Predefined configuration presets for common use cases
pub struct ConfigPresets;

impl ConfigPresets {
    /// Development configuration (no backoff, short timeouts)
    pub fn development() -> ChimeConfig {
        ChimeConfig {
            session: SessionConfig::low_latency(),
            retry: RetryConfig::immediate(),
            channels: ChannelConfig::default(),
        }
    }

    /// Production configuration
    pub fn production() -> ChimeConfig {
        ChimeConfig::default()
    }

    /// Testing configuration (fast retries, short timeouts)
    pub fn testing() -> ChimeConfig {
        ChimeConfig {
            session: SessionConfig::low_latency(),
            retry: RetryConfig {
                max_retries: MAX_RETRIES,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                backoff_multiplier: 2.0,
            },
            channels: ChannelConfig::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
