//! Channel Utilities
//!
//! Bounded tokio channels carrying transport events into the runtime task.

use crate::channel::communication::TransportEvent;
use crate::config::ChannelConfig;
use crate::errors::ChimeError;

pub type TransportEventSender = tokio::sync::mpsc::Sender<TransportEvent>;
pub type TransportEventReceiver = tokio::sync::mpsc::Receiver<TransportEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded transport event channel (Transport → Runtime)
pub fn create_transport_event_channel(
    config: &ChannelConfig,
) -> (TransportEventSender, TransportEventReceiver) {
    tokio::sync::mpsc::channel(config.transport_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send Utilities
// ----------------------------------------------------------------------------

/// Push an event without awaiting; used by synchronous transports
pub fn try_emit(sender: &TransportEventSender, event: TransportEvent) -> Result<(), ChimeError> {
    sender.try_send(event).map_err(|e| match e {
        tokio::sync::mpsc::error::TrySendError::Full(event) => {
            ChimeError::channel_error(format!("Transport event channel full, dropped {}", event.kind()))
        }
        tokio::sync::mpsc::error::TrySendError::Closed(_) => {
            ChimeError::channel_error("Transport event channel closed")
        }
    })
}
