//! Session State Machine
//!
//! Pure transition table for the client session lifecycle. A transition
//! consumes the current state and an input, and yields the next state, the
//! side effects the manager must execute, and an audit record. Retry and
//! persistence decisions are made by the caller and passed in as part of the
//! input, so this module never touches storage, transports or clocks.

use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::ChimeError;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle state of the single session owned by a `SessionManager`
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Nothing in flight; initial state and the state after cancel/sign-out
    Idle,
    /// A transport connect has been issued (or a reconnect is scheduled)
    Connecting,
    /// The service wants a username and password
    AwaitingCredentials,
    /// Credentials were handed to the transport; waiting for the verdict
    Authenticating,
    /// Live session
    Connected { display_name: String },
    /// A live (or credential-waiting) session was dropped by the remote
    Disconnected { reason: String },
    /// The attempt chain gave up; requires an explicit connect()
    Failed { error: ChimeError },
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

impl SessionState {
    /// Get current state name for logging/audit
    pub fn state_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::AwaitingCredentials => "AwaitingCredentials",
            SessionState::Authenticating => "Authenticating",
            SessionState::Connected { .. } => "Connected",
            SessionState::Disconnected { .. } => "Disconnected",
            SessionState::Failed { .. } => "Failed",
        }
    }

    /// Whether connect() may start a new attempt chain from this state
    pub fn accepts_connect(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Disconnected { .. } | SessionState::Failed { .. }
        )
    }

    /// Whether an attempt is in flight (cancel() has something to abandon)
    pub fn is_attempt_in_flight(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::AwaitingCredentials
                | SessionState::Authenticating
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed { .. })
    }

    /// Display name of the connected user, if any
    pub fn display_name(&self) -> Option<&str> {
        match self {
            SessionState::Connected { display_name } => Some(display_name),
            _ => None,
        }
    }

    /// Process an input and transition to a new state (consumes self)
    pub fn transition(
        self,
        input: SessionInput,
        at: Timestamp,
    ) -> Result<StateTransition, StateTransitionError> {
        let from_state = self.state_name();
        let input_name = input.name();

        let (new_state, effects) = match (self, input) {
            // Starting a chain
            (state, SessionInput::Connect) if state.accepts_connect() => {
                (SessionState::Connecting, vec![SessionEffect::OpenTransport])
            }

            // From Connecting
            (SessionState::Connecting, SessionInput::AuthenticateRequired { resubmit: true }) => (
                SessionState::Authenticating,
                vec![SessionEffect::Authenticate],
            ),
            (SessionState::Connecting, SessionInput::AuthenticateRequired { resubmit: false }) => {
                (SessionState::AwaitingCredentials, Vec::new())
            }

            // From AwaitingCredentials
            (SessionState::AwaitingCredentials, SessionInput::SubmitCredentials) => (
                SessionState::Authenticating,
                vec![SessionEffect::Authenticate],
            ),
            (SessionState::AwaitingCredentials, SessionInput::Disconnected { reason }) => {
                (SessionState::Disconnected { reason }, Vec::new())
            }

            // From Authenticating
            (
                SessionState::Authenticating,
                SessionInput::CredentialsRejected { retry: true, .. },
            ) => (SessionState::AwaitingCredentials, Vec::new()),
            (
                SessionState::Authenticating,
                SessionInput::CredentialsRejected { error, retry: false },
            ) => (
                SessionState::Failed { error },
                vec![SessionEffect::CloseTransport],
            ),

            // Attempt outcomes shared by Connecting and Authenticating
            (
                SessionState::Connecting | SessionState::Authenticating,
                SessionInput::Connected { display_name },
            ) => (SessionState::Connected { display_name }, Vec::new()),
            (
                SessionState::Connecting | SessionState::Authenticating,
                SessionInput::Failure {
                    retry_after: Some(delay),
                    ..
                },
            ) => (
                SessionState::Connecting,
                vec![
                    SessionEffect::AbandonAttempt,
                    SessionEffect::ScheduleReconnect { delay },
                ],
            ),
            (
                SessionState::Connecting | SessionState::Authenticating,
                SessionInput::Failure {
                    error,
                    retry_after: None,
                },
            ) => (
                SessionState::Failed { error },
                vec![SessionEffect::CloseTransport],
            ),

            // From Connected
            (SessionState::Connected { .. }, SessionInput::Disconnected { reason }) => {
                (SessionState::Disconnected { reason }, Vec::new())
            }

            // Cancellation of an in-flight attempt
            (state, SessionInput::Cancel) if state.is_attempt_in_flight() => {
                (SessionState::Idle, vec![SessionEffect::AbandonAttempt])
            }

            // Universal transitions
            (_, SessionInput::SignOut) => (SessionState::Idle, vec![SessionEffect::CloseTransport]),
            (_, SessionInput::Fault { error }) => (
                SessionState::Failed { error },
                vec![SessionEffect::CloseTransport],
            ),

            // Invalid transitions
            (_state, input) => {
                return Err(StateTransitionError::InvalidTransition {
                    from_state: from_state.to_string(),
                    event: input_name.to_string(),
                    reason: format!("{} has no transition from {}", input.name(), from_state),
                });
            }
        };

        let record = TransitionRecord {
            at,
            from: from_state.to_string(),
            to: new_state.state_name().to_string(),
            input: input_name.to_string(),
        };

        Ok(StateTransition {
            new_state,
            effects,
            record,
        })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connected { display_name } => write!(f, "Connected({})", display_name),
            SessionState::Disconnected { reason } => write!(f, "Disconnected({})", reason),
            SessionState::Failed { error } => write!(f, "Failed({})", error),
            other => f.write_str(other.state_name()),
        }
    }
}

// ----------------------------------------------------------------------------
// State Transition Inputs
// ----------------------------------------------------------------------------

/// Inputs that drive the session state machine
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Explicit connect() with credentials already verified present
    Connect,
    /// The transport asked for credentials; `resubmit` when the current
    /// attempt chain already holds credentials to send again
    AuthenticateRequired { resubmit: bool },
    /// The user supplied a username and password
    SubmitCredentials,
    /// The transport reports a live session
    Connected { display_name: String },
    /// The attempt failed; `retry_after` is set when the retry policy allows
    /// another attempt
    Failure {
        error: ChimeError,
        retry_after: Option<Duration>,
    },
    /// The service rejected submitted credentials
    CredentialsRejected { error: ChimeError, retry: bool },
    /// The remote dropped the session
    Disconnected { reason: String },
    /// Abandon the in-flight attempt
    Cancel,
    /// Clear credentials and close everything
    SignOut,
    /// A local failure (credential storage) that ends the session
    Fault { error: ChimeError },
}

impl SessionInput {
    /// Stable input name for audit records
    pub fn name(&self) -> &'static str {
        match self {
            SessionInput::Connect => "Connect",
            SessionInput::AuthenticateRequired { .. } => "AuthenticateRequired",
            SessionInput::SubmitCredentials => "SubmitCredentials",
            SessionInput::Connected { .. } => "Connected",
            SessionInput::Failure { .. } => "Failure",
            SessionInput::CredentialsRejected { .. } => "CredentialsRejected",
            SessionInput::Disconnected { .. } => "Disconnected",
            SessionInput::Cancel => "Cancel",
            SessionInput::SignOut => "SignOut",
            SessionInput::Fault { .. } => "Fault",
        }
    }
}

// ----------------------------------------------------------------------------
// State Transition Results
// ----------------------------------------------------------------------------

/// Side effects the manager executes after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Issue a transport connect with the stored credentials
    OpenTransport,
    /// Hand the pending username/password to the transport
    Authenticate,
    /// Drop whatever the transport has in flight
    AbandonAttempt,
    /// Close the transport completely
    CloseTransport,
    /// Issue a new transport connect after `delay`
    ScheduleReconnect { delay: Duration },
}

/// Result of a state transition
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// New session state
    pub new_state: SessionState,
    /// Effects to execute as result of transition
    pub effects: Vec<SessionEffect>,
    /// Audit trail entry
    pub record: TransitionRecord,
}

/// Audit trail entry for state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub at: Timestamp,
    pub from: String,
    pub to: String,
    pub input: String,
}

impl fmt::Display for TransitionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.input)
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateTransitionError {
    /// Input has no transition from the current state
    #[error("Invalid transition from {from_state} on event {event}: {reason}")]
    InvalidTransition {
        from_state: String,
        event: String,
        reason: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
