//! Connection Transport Contract
//!
//! The core's only network-facing dependency. Implementations wrap the real
//! chat service client; the core never sees its wire format.

pub mod scripted;

pub use scripted::{ScriptCalls, ScriptProbe, ScriptStep, ScriptedTransport, TransportScript};

use crate::channel::TransportEventSender;
use crate::errors::TransportError;

/// Parameters for opening a connection
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub account_id: String,
    pub device_token: String,
    /// Previously issued session token; `None` forces interactive login
    pub session_token: Option<String>,
}

impl core::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("account_id", &self.account_id)
            .field("device_token", &"<redacted>")
            .field("has_session_token", &self.session_token.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Connection to the remote chat service
///
/// Every operation starts work and returns without waiting for the service.
/// Outcomes (authenticate-required, connected, disconnected, roster entries,
/// token refreshes) arrive later as `TransportEvent`s on the attached sender,
/// in the order the service produced them. An `Err` return means the
/// operation could not even be started.
pub trait ConnectionTransport: Send {
    /// Attach the event sender created by the runtime
    fn attach_events(&mut self, events: TransportEventSender);

    /// Start connecting with the stored account and tokens
    fn connect(&mut self, request: ConnectRequest) -> Result<(), TransportError>;

    /// Submit a username and password for the pending connection
    fn authenticate(&mut self, username: &str, password: &str) -> Result<(), TransportError>;

    /// Drop any in-flight connect or authenticate attempt
    fn abandon(&mut self);

    /// Close the connection entirely
    fn disconnect(&mut self);
}
