//! Transport Event Protocol Types
//!
//! Everything a `ConnectionTransport` pushes into the core flows through
//! these types. Event names serialize in kebab-case so scripts and logs use
//! the same names as the dispatcher's event kinds.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::roster::Entity;

// ----------------------------------------------------------------------------
// Transport Event: Transport → Dispatcher
// ----------------------------------------------------------------------------

/// Events pushed by the transport, delivered in emission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportEvent {
    /// The service needs a username and password
    AuthenticateRequired,
    /// Session established
    Connected { display_name: String },
    /// Session dropped or attempt failed
    Disconnected { reason: String },
    /// Diagnostic line from the transport
    LogMessage { level: LogLevel, text: String },
    /// Connection progress report
    Progress { percent: u8, message: String },
    NewRoom { entity: Entity },
    NewConversation { entity: Entity },
    /// Display name or topic of a known entity changed
    EntityChanged { entity: Entity },
    EntityRemoved { id: String },
    /// The service issued a new session token
    SessionTokenChanged { token: String },
}

impl TransportEvent {
    /// Dispatch kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            TransportEvent::AuthenticateRequired => EventKind::Authenticate,
            TransportEvent::Connected { .. } => EventKind::Connected,
            TransportEvent::Disconnected { .. } => EventKind::Disconnected,
            TransportEvent::LogMessage { .. } => EventKind::LogMessage,
            TransportEvent::Progress { .. } => EventKind::Progress,
            TransportEvent::NewRoom { .. } => EventKind::NewRoom,
            TransportEvent::NewConversation { .. } => EventKind::NewConversation,
            TransportEvent::EntityChanged { .. } => EventKind::EntityChanged,
            TransportEvent::EntityRemoved { .. } => EventKind::EntityRemoved,
            TransportEvent::SessionTokenChanged { .. } => EventKind::SessionTokenChanged,
        }
    }
}

// ----------------------------------------------------------------------------
// Event Kind
// ----------------------------------------------------------------------------

/// Named event kinds subscribers register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    NewRoom,
    NewConversation,
    Connected,
    Disconnected,
    Authenticate,
    Progress,
    LogMessage,
    SessionTokenChanged,
    EntityChanged,
    EntityRemoved,
}

impl EventKind {
    /// Every kind, in a stable order
    pub const ALL: [EventKind; 10] = [
        EventKind::NewRoom,
        EventKind::NewConversation,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Authenticate,
        EventKind::Progress,
        EventKind::LogMessage,
        EventKind::SessionTokenChanged,
        EventKind::EntityChanged,
        EventKind::EntityRemoved,
    ];

    /// Kinds that drive the session state machine
    pub const SESSION: [EventKind; 4] = [
        EventKind::Authenticate,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::SessionTokenChanged,
    ];

    /// Kinds that mutate the roster
    pub const ROSTER: [EventKind; 4] = [
        EventKind::NewRoom,
        EventKind::NewConversation,
        EventKind::EntityChanged,
        EventKind::EntityRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewRoom => "new-room",
            EventKind::NewConversation => "new-conversation",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Authenticate => "authenticate",
            EventKind::Progress => "progress",
            EventKind::LogMessage => "log-message",
            EventKind::SessionTokenChanged => "session-token-changed",
            EventKind::EntityChanged => "entity-changed",
            EventKind::EntityRemoved => "entity-removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Log Level
// ----------------------------------------------------------------------------

/// Severity of a transport log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
