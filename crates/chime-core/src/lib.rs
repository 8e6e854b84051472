//! Chime Core
//!
//! Session lifecycle and roster synchronization for the Chime desktop chat
//! client. The crate owns credential storage, the connection state machine,
//! retry and backoff, and the room/conversation roster; the network client
//! itself sits behind the `ConnectionTransport` trait.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod errors;
pub mod retry;
pub mod roster;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{
    create_transport_event_channel, EventKind, LogLevel, TransportEvent, TransportEventReceiver,
    TransportEventSender,
};
pub use config::{ChannelConfig, ChimeConfig, ConfigPresets, RetryConfig, SessionConfig};
pub use credentials::{
    generate_device_token, provision_account, CredentialStore, Credentials, FileCredentialStore,
    MemoryCredentialStore,
};
pub use dispatcher::{DispatchStats, EventDispatcher, SubscriptionId};
pub use errors::{
    ChimeError, ChimeResult, DuplicateEntityWarning, Result, StorageError, TransportError,
};
pub use retry::{BackoffPolicy, RetryPolicy, RetryRecord, MAX_RETRIES};
pub use roster::{Entity, EntityKind, Roster, RosterEntry, RosterRow, SharedRoster};
pub use runtime::{ClientBuilder, ClientHandle};
pub use session::{
    SessionEffect, SessionInput, SessionManager, SessionSnapshot, SessionState, SessionUpdate,
    StateTransition, StateTransitionError, TransitionRecord,
};
pub use transport::{
    ConnectRequest, ConnectionTransport, ScriptProbe, ScriptedTransport, TransportScript,
};
pub use types::{SystemTimeSource, TimeSource, Timestamp};

#[cfg(any(test, feature = "testing"))]
pub use types::MockTimeSource;
