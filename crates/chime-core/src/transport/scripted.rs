//! Scripted transport
//!
//! Plays back a declarative list of events for each connect and authenticate
//! call. Used by the CLI `replay` command and by tests in place of the real
//! service client.
//!
//! ```toml
//! [[connect]]
//! events = [{ type = "authenticate-required" }]
//!
//! [[authenticate]]
//! events = [
//!     { type = "session-token-changed", token = "s-1" },
//!     { type = "connected", display_name = "Alice" },
//! ]
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ConnectRequest, ConnectionTransport};
use crate::channel::{try_emit, TransportEvent, TransportEventSender};
use crate::errors::{ChimeError, TransportError};

// ----------------------------------------------------------------------------
// Script Definition
// ----------------------------------------------------------------------------

/// Events emitted in response to one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub events: Vec<TransportEvent>,
}

impl ScriptStep {
    pub fn new(events: Vec<TransportEvent>) -> Self {
        Self { events }
    }
}

/// Responses for successive connect and authenticate calls
///
/// The n-th call plays the n-th step; once steps run out the last one
/// repeats. An empty list emits nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportScript {
    #[serde(default)]
    pub connect: Vec<ScriptStep>,
    #[serde(default)]
    pub authenticate: Vec<ScriptStep>,
}

impl TransportScript {
    /// Parse a script from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ChimeError> {
        toml::from_str(contents)
            .map_err(|e| ChimeError::config_error(format!("Invalid transport script: {}", e)))
    }

    /// Read and parse a script file
    pub fn load(path: &Path) -> Result<Self, ChimeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChimeError::config_error(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn on_connect(mut self, events: Vec<TransportEvent>) -> Self {
        self.connect.push(ScriptStep::new(events));
        self
    }

    pub fn on_authenticate(mut self, events: Vec<TransportEvent>) -> Self {
        self.authenticate.push(ScriptStep::new(events));
        self
    }
}

fn step_for(steps: &[ScriptStep], call: usize) -> Option<&ScriptStep> {
    steps.get(call).or_else(|| steps.last())
}

// ----------------------------------------------------------------------------
// Call Recording
// ----------------------------------------------------------------------------

/// What the session asked the transport to do
#[derive(Debug, Clone, Default)]
pub struct ScriptCalls {
    pub connects: usize,
    pub authenticates: usize,
    pub abandons: usize,
    pub disconnects: usize,
    pub last_request: Option<ConnectRequest>,
    pub usernames: Vec<String>,
}

/// Shared view of a scripted transport's calls, usable after the transport
/// has been moved into a runtime
#[derive(Debug, Clone, Default)]
pub struct ScriptProbe {
    calls: Arc<Mutex<ScriptCalls>>,
}

impl ScriptProbe {
    pub fn snapshot(&self) -> ScriptCalls {
        self.calls.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.calls.lock().connects
    }

    pub fn authenticates(&self) -> usize {
        self.calls.lock().authenticates
    }

    pub fn abandons(&self) -> usize {
        self.calls.lock().abandons
    }

    pub fn disconnects(&self) -> usize {
        self.calls.lock().disconnects
    }
}

// ----------------------------------------------------------------------------
// Scripted Transport
// ----------------------------------------------------------------------------

/// `ConnectionTransport` that replays a `TransportScript`
#[derive(Debug)]
pub struct ScriptedTransport {
    script: TransportScript,
    events: Option<TransportEventSender>,
    probe: ScriptProbe,
}

impl ScriptedTransport {
    pub fn new(script: TransportScript) -> Self {
        Self {
            script,
            events: None,
            probe: ScriptProbe::default(),
        }
    }

    /// Handle for inspecting calls made to this transport
    pub fn probe(&self) -> ScriptProbe {
        self.probe.clone()
    }

    fn emit_step(&self, step: Option<&ScriptStep>) -> Result<(), TransportError> {
        let Some(step) = step else {
            return Ok(());
        };
        let sender = self.events.as_ref().ok_or_else(|| TransportError::Unavailable {
            reason: "event sender not attached".to_string(),
        })?;

        for event in &step.events {
            debug!(kind = %event.kind(), "Scripted transport emitting event");
            if let Err(e) = try_emit(sender, event.clone()) {
                warn!("Scripted transport could not emit event: {}", e);
                return Err(TransportError::Unavailable {
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl ConnectionTransport for ScriptedTransport {
    fn attach_events(&mut self, events: TransportEventSender) {
        self.events = Some(events);
    }

    fn connect(&mut self, request: ConnectRequest) -> Result<(), TransportError> {
        let call = {
            let mut calls = self.probe.calls.lock();
            calls.connects += 1;
            calls.last_request = Some(request);
            calls.connects - 1
        };
        self.emit_step(step_for(&self.script.connect, call))
    }

    fn authenticate(&mut self, username: &str, _password: &str) -> Result<(), TransportError> {
        let call = {
            let mut calls = self.probe.calls.lock();
            calls.authenticates += 1;
            calls.usernames.push(username.to_string());
            calls.authenticates - 1
        };
        self.emit_step(step_for(&self.script.authenticate, call))
    }

    fn abandon(&mut self) {
        self.probe.calls.lock().abandons += 1;
    }

    fn disconnect(&mut self) {
        self.probe.calls.lock().disconnects += 1;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
