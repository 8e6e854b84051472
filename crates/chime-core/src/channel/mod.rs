//! Channel Module
//!
//! - `communication`: transport event types and event kinds
//! - `utils`: channel constructors and non-blocking send helpers

pub mod communication;
pub mod utils;

pub use communication::{EventKind, LogLevel, TransportEvent};

pub use crate::config::ChannelConfig;

pub use utils::{
    create_transport_event_channel, try_emit, TransportEventReceiver, TransportEventSender,
};
