//! Session Manager
//!
//! Sole owner of the session state. Every change goes through the pure
//! state machine in `session::state`; the manager supplies the retry and
//! persistence decisions, executes the resulting effects against the
//! transport and credential store, and publishes each transition.
//!
//! The manager is synchronous. Timers (attempt timeouts and delayed
//! reconnects) are plain deadlines checked by `poll_timers`, so the caller
//! decides how to wait for them.

use core::time::Duration;
use std::collections::VecDeque;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::state::{
    SessionEffect, SessionInput, SessionState, StateTransitionError, TransitionRecord,
};
use crate::channel::TransportEvent;
use crate::config::{ChimeConfig, SessionConfig};
use crate::credentials::{self, CredentialStore, Credentials, SESSION_TOKEN};
use crate::errors::{ChimeError, Result, TransportError};
use crate::retry::{BackoffPolicy, RetryPolicy, RetryRecord};
use crate::transport::{ConnectRequest, ConnectionTransport};
use crate::types::{SystemTimeSource, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Observer Types
// ----------------------------------------------------------------------------

/// Notifications published to session subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// The state machine moved; `state` is the state entered
    Transition {
        record: TransitionRecord,
        state: SessionState,
    },
    /// A failed attempt will be retried after `delay`
    RetryScheduled { attempt: u32, delay: Duration },
    /// Progress reported by the transport
    Progress { percent: u8, message: String },
}

/// Read-only view of the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Current (or just failed) attempt chain, without submitted credentials
    pub retry: Option<RetryRecord>,
}

impl SessionSnapshot {
    pub fn display_name(&self) -> Option<&str> {
        self.state.display_name()
    }

    pub fn attempt(&self) -> u32 {
        self.retry.as_ref().map(|r| r.attempt).unwrap_or(0)
    }
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Drives one client session through connect, authenticate and reconnect
pub struct SessionManager<C: TimeSource = SystemTimeSource> {
    config: SessionConfig,
    store: Box<dyn CredentialStore>,
    transport: Box<dyn ConnectionTransport>,
    policy: Box<dyn RetryPolicy>,
    clock: C,
    state: SessionState,
    retry: Option<RetryRecord>,
    /// Last session token known to be in the store
    persisted_token: Option<String>,
    attempt_deadline: Option<Timestamp>,
    reconnect_at: Option<Timestamp>,
    audit: VecDeque<TransitionRecord>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl<C: TimeSource> SessionManager<C> {
    /// Create a manager in `Idle`; the transport must already have its
    /// event sender attached
    pub fn new(
        config: &ChimeConfig,
        store: Box<dyn CredentialStore>,
        transport: Box<dyn ConnectionTransport>,
        clock: C,
    ) -> Self {
        let (updates, _) = broadcast::channel(config.session.update_buffer_size.max(1));
        Self {
            config: config.session.clone(),
            store,
            transport,
            policy: Box::new(BackoffPolicy::new(config.retry.clone())),
            clock,
            state: SessionState::Idle,
            retry: None,
            persisted_token: None,
            attempt_deadline: None,
            reconnect_at: None,
            audit: VecDeque::new(),
            updates,
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: Box<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Start a new attempt chain
    ///
    /// A no-op while an attempt is in flight or the session is live. Fails
    /// with `MissingCredentials` (state unchanged) when no account or device
    /// token is stored.
    pub fn connect(&mut self) -> Result<()> {
        if !self.state.accepts_connect() {
            debug!(state = %self.state, "connect() ignored, session already active");
            return Ok(());
        }

        let credentials = match Credentials::load(&*self.store) {
            Ok(credentials) => credentials,
            Err(e) => {
                let error = ChimeError::from(e);
                error!("Cannot read credentials: {}", error);
                self.fault(error.clone());
                return Err(error);
            }
        };
        credentials.require_login()?;

        self.retry = Some(RetryRecord::new(self.clock.now()));
        self.persisted_token = credentials.session_token;
        self.apply(SessionInput::Connect)?;
        Ok(())
    }

    /// Hand a username and password to the transport
    ///
    /// Only valid while `AwaitingCredentials`. The password stays in memory
    /// for the rest of the attempt chain and is never stored.
    pub fn submit_credentials(&mut self, username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() {
            return Err(ChimeError::invalid_input("username is empty"));
        }
        if self.state != SessionState::AwaitingCredentials {
            return Err(StateTransitionError::InvalidTransition {
                from_state: self.state.state_name().to_string(),
                event: SessionInput::SubmitCredentials.name().to_string(),
                reason: "no credentials requested".to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        self.retry
            .get_or_insert_with(|| RetryRecord::new(now))
            .set_login(username, password);
        self.apply(SessionInput::SubmitCredentials)?;
        Ok(())
    }

    /// Abandon the in-flight attempt and return to `Idle`
    pub fn cancel(&mut self) -> bool {
        match self.apply(SessionInput::Cancel) {
            Ok(()) => true,
            Err(e) => {
                debug!("cancel() ignored: {}", e);
                false
            }
        }
    }

    /// Close the session and clear every stored credential
    pub fn sign_out(&mut self) -> Result<()> {
        self.apply(SessionInput::SignOut)?;
        self.persisted_token = None;
        credentials::sign_out(&mut *self.store)?;
        info!("Signed out");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transport Events
    // ------------------------------------------------------------------------

    /// Feed one transport event into the state machine
    ///
    /// Events with no meaning in the current state are logged and dropped.
    pub fn handle_event(&mut self, event: &TransportEvent) {
        if self.reconnect_at.is_some() && is_session_event(event) {
            debug!(kind = %event.kind(), "Event from abandoned attempt ignored");
            return;
        }

        match event {
            TransportEvent::AuthenticateRequired => self.on_authenticate_required(),
            TransportEvent::Connected { display_name } => {
                let input = SessionInput::Connected {
                    display_name: display_name.clone(),
                };
                self.apply_or_ignore(input);
            }
            TransportEvent::Disconnected { reason } => match self.state {
                SessionState::Connecting | SessionState::Authenticating => {
                    self.fail_attempt(
                        TransportError::Disconnected {
                            reason: reason.clone(),
                        }
                        .into(),
                    );
                }
                _ => self.apply_or_ignore(SessionInput::Disconnected {
                    reason: reason.clone(),
                }),
            },
            TransportEvent::SessionTokenChanged { token } => self.on_session_token(token),
            TransportEvent::Progress { percent, message } => {
                let _ = self.updates.send(SessionUpdate::Progress {
                    percent: *percent,
                    message: message.clone(),
                });
            }
            _ => {}
        }
    }

    fn on_authenticate_required(&mut self) {
        match self.state {
            SessionState::Connecting => {
                let resubmit = self.retry.as_ref().map_or(false, RetryRecord::has_login);
                self.apply_or_ignore(SessionInput::AuthenticateRequired { resubmit });
            }
            SessionState::Authenticating => {
                let error = ChimeError::Transport(TransportError::Rejected {
                    reason: "credentials rejected".to_string(),
                });
                let now = self.clock.now();
                let record = self.retry.get_or_insert_with(|| RetryRecord::new(now));
                record.record_failure(error.clone());
                record.forget_login();
                let retry = self.policy.should_retry(record);
                warn!(attempt = record.attempt, retry, "Credentials rejected");
                self.apply_or_ignore(SessionInput::CredentialsRejected { error, retry });
            }
            _ => debug!(state = %self.state, "authenticate-required ignored"),
        }
    }

    fn on_session_token(&mut self, token: &str) {
        if !(self.state.is_attempt_in_flight() || self.state.is_connected()) {
            debug!(state = %self.state, "Session token outside a session ignored");
            return;
        }
        if self.persisted_token.as_deref() == Some(token) {
            debug!("Session token unchanged, not rewritten");
            return;
        }

        match self.store.set(SESSION_TOKEN, token) {
            Ok(()) => {
                self.persisted_token = Some(token.to_string());
                info!("Session token persisted");
            }
            Err(e) => {
                error!("Failed to persist session token: {}", e);
                self.fault(e.into());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    /// Earliest pending timer (reconnect or attempt timeout)
    pub fn next_deadline(&self) -> Option<Timestamp> {
        match (self.reconnect_at, self.attempt_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Time left until the earliest pending timer
    pub fn time_until_next_deadline(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.duration_since(self.clock.now()))
    }

    /// Fire any timers whose deadline has passed
    pub fn poll_timers(&mut self) {
        let now = self.clock.now();

        if let Some(at) = self.reconnect_at {
            if now >= at {
                self.reconnect_at = None;
                if self.state == SessionState::Connecting {
                    debug!("Reconnect timer fired");
                    self.open_transport();
                }
            }
        }

        if let Some(deadline) = self.attempt_deadline {
            if now >= deadline {
                self.attempt_deadline = None;
                let timeout = match self.state {
                    SessionState::Connecting => self.config.connect_timeout,
                    SessionState::Authenticating => self.config.authenticate_timeout,
                    _ => return,
                };
                warn!(state = %self.state, "Attempt timed out");
                self.fail_attempt(
                    TransportError::Timeout {
                        duration_ms: timeout.as_millis() as u64,
                    }
                    .into(),
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            retry: self.retry.as_ref().map(|record| {
                let mut record = record.clone();
                record.forget_login();
                record
            }),
        }
    }

    pub fn retry_record(&self) -> Option<&RetryRecord> {
        self.retry.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Most recent transition records, oldest first
    pub fn audit_trail(&self, limit: usize) -> Vec<TransitionRecord> {
        let skip = self.audit.len().saturating_sub(limit);
        self.audit.iter().skip(skip).cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Transition Plumbing
    // ------------------------------------------------------------------------

    fn apply_or_ignore(&mut self, input: SessionInput) {
        if let Err(e) = self.apply(input) {
            debug!("{}", e);
        }
    }

    /// Count a failed attempt and either schedule a retry or give up
    fn fail_attempt(&mut self, error: ChimeError) {
        let now = self.clock.now();
        let record = self.retry.get_or_insert_with(|| RetryRecord::new(now));
        record.record_failure(error.clone());

        let retry_after = if self.policy.should_retry(record) {
            let delay = self.policy.next_delay(record);
            record.next_allowed_at = now.add_duration(delay);
            warn!(attempt = record.attempt, ?delay, "Attempt failed, retrying: {}", error);
            Some(delay)
        } else {
            error!(attempt = record.attempt, "Session failed: {}", error);
            None
        };

        self.apply_or_ignore(SessionInput::Failure { error, retry_after });
    }

    fn fault(&mut self, error: ChimeError) {
        self.apply_or_ignore(SessionInput::Fault { error });
    }

    fn apply(&mut self, input: SessionInput) -> core::result::Result<(), StateTransitionError> {
        let transition = self.state.clone().transition(input, self.clock.now())?;

        info!(
            from = %transition.record.from,
            to = %transition.record.to,
            input = %transition.record.input,
            "Session transition"
        );
        if let SessionState::Connected { display_name } = &transition.new_state {
            info!(display_name = %display_name, "Connected");
        }

        self.state = transition.new_state;
        self.on_enter_state();

        if self.audit.len() >= self.config.audit_trail_size.max(1) {
            self.audit.pop_front();
        }
        self.audit.push_back(transition.record.clone());
        let _ = self.updates.send(SessionUpdate::Transition {
            record: transition.record,
            state: self.state.clone(),
        });

        for effect in transition.effects {
            self.execute(effect);
        }
        Ok(())
    }

    fn on_enter_state(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Connected { .. } | SessionState::Disconnected { .. } => {
                self.retry = None;
                self.attempt_deadline = None;
                self.reconnect_at = None;
            }
            SessionState::AwaitingCredentials | SessionState::Failed { .. } => {
                self.attempt_deadline = None;
                self.reconnect_at = None;
            }
            SessionState::Connecting | SessionState::Authenticating => {}
        }
    }

    fn execute(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::OpenTransport => self.open_transport(),
            SessionEffect::Authenticate => self.start_authenticate(),
            SessionEffect::AbandonAttempt => {
                self.attempt_deadline = None;
                self.transport.abandon();
            }
            SessionEffect::CloseTransport => {
                self.attempt_deadline = None;
                self.reconnect_at = None;
                self.transport.disconnect();
            }
            SessionEffect::ScheduleReconnect { delay } => {
                let attempt = self.retry.as_ref().map(|r| r.attempt).unwrap_or(0);
                let _ = self
                    .updates
                    .send(SessionUpdate::RetryScheduled { attempt, delay });
                if delay.is_zero() {
                    self.open_transport();
                } else {
                    self.reconnect_at = Some(self.clock.now().add_duration(delay));
                }
            }
        }
    }

    fn open_transport(&mut self) {
        let credentials = match Credentials::load(&*self.store) {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Cannot read credentials: {}", e);
                self.fault(e.into());
                return;
            }
        };
        let request = match credentials.require_login() {
            Ok((account_id, device_token)) => ConnectRequest {
                account_id: account_id.to_string(),
                device_token: device_token.to_string(),
                session_token: credentials.session_token.clone(),
            },
            Err(e) => {
                self.fault(e);
                return;
            }
        };

        debug!(account = %request.account_id, silent = request.session_token.is_some(), "Opening transport");
        self.attempt_deadline = Some(self.clock.now().add_duration(self.config.connect_timeout));
        if let Err(e) = self.transport.connect(request) {
            self.fail_attempt(e.into());
        }
    }

    fn start_authenticate(&mut self) {
        let Some(login) = self.retry.as_ref().and_then(|r| r.login()).cloned() else {
            self.fault(ChimeError::invalid_input("no credentials to submit"));
            return;
        };

        self.attempt_deadline =
            Some(self.clock.now().add_duration(self.config.authenticate_timeout));
        if let Err(e) = self.transport.authenticate(&login.username, &login.password) {
            self.fail_attempt(e.into());
        }
    }
}

fn is_session_event(event: &TransportEvent) -> bool {
    matches!(
        event,
        TransportEvent::AuthenticateRequired
            | TransportEvent::Connected { .. }
            | TransportEvent::Disconnected { .. }
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
