//! Event Dispatcher
//!
//! Typed fan-out of transport events. Subscribers register a callback per
//! event kind; each event is handed to that kind's callbacks synchronously,
//! in registration order, before the next event is looked at.

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::channel::{EventKind, TransportEvent, TransportEventReceiver};

/// Callback invoked for every event of a subscribed kind
pub type EventCallback = Box<dyn FnMut(&TransportEvent) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events_dispatched: u64,
    pub deliveries: u64,
    /// Events for which no subscriber was registered
    pub unhandled_events: u64,
}

// ----------------------------------------------------------------------------
// Event Dispatcher
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct EventDispatcher {
    subscribers: HashMap<EventKind, Vec<(SubscriptionId, EventCallback)>>,
    next_id: u64,
    stats: DispatchStats,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for events of `kind`
    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: FnMut(&TransportEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for callbacks in self.subscribers.values_mut() {
            if let Some(position) = callbacks.iter().position(|(sub, _)| *sub == id) {
                drop(callbacks.remove(position));
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver one event; returns the number of callbacks invoked
    pub fn dispatch(&mut self, event: &TransportEvent) -> usize {
        let kind = event.kind();
        self.stats.events_dispatched += 1;

        let delivered = match self.subscribers.get_mut(&kind) {
            Some(callbacks) if !callbacks.is_empty() => {
                for (_, callback) in callbacks.iter_mut() {
                    callback(event);
                }
                callbacks.len()
            }
            _ => 0,
        };

        if delivered == 0 {
            self.stats.unhandled_events += 1;
            debug!(kind = %kind, "No subscriber for event");
        } else {
            trace!(kind = %kind, delivered, "Event dispatched");
        }
        self.stats.deliveries += delivered as u64;
        delivered
    }

    /// Dispatch everything from `receiver` until every sender is dropped
    pub async fn run(&mut self, mut receiver: TransportEventReceiver) -> DispatchStats {
        while let Some(event) = receiver.recv().await {
            self.dispatch(&event);
        }
        debug!("Transport event channel closed, dispatcher stopping");
        self.stats
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }
}

impl core::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .subscribers
            .iter()
            .map(|(kind, callbacks)| (*kind, callbacks.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("subscribers", &counts)
            .field("stats", &self.stats)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::create_transport_event_channel;
    use crate::config::ChannelConfig;
    use crate::roster::Entity;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> EventCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |tag: &str| -> EventCallback {
                let log = log.clone();
                let tag = tag.to_string();
                Box::new(move |event: &TransportEvent| {
                    log.lock().push(format!("{}:{}", tag, event.kind()));
                })
            }
        };
        (log, make)
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let (log, make) = recorder();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(EventKind::Connected, make("first"));
        dispatcher.subscribe(EventKind::Connected, make("second"));
        dispatcher.subscribe(EventKind::NewRoom, make("roster"));

        let delivered = dispatcher.dispatch(&TransportEvent::Connected {
            display_name: "Alice".into(),
        });
        assert_eq!(delivered, 2);
        dispatcher.dispatch(&TransportEvent::NewRoom {
            entity: Entity::room("general", "General"),
        });

        assert_eq!(
            *log.lock(),
            vec!["first:connected", "second:connected", "roster:new-room"]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let (log, make) = recorder();
        let mut dispatcher = EventDispatcher::new();
        let id = dispatcher.subscribe(EventKind::Progress, make("p"));
        let kept = dispatcher.subscribe(EventKind::Connected, make("kept"));
        assert_eq!(dispatcher.subscriber_count(EventKind::Progress), 1);

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.subscriber_count(EventKind::Progress), 0);
        assert_eq!(dispatcher.subscriber_count(EventKind::Connected), 1);
        assert_ne!(id, kept);

        let delivered = dispatcher.dispatch(&TransportEvent::Progress {
            percent: 50,
            message: "syncing".into(),
        });
        assert_eq!(delivered, 0);
        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.stats().unhandled_events, 1);
    }

    #[tokio::test]
    async fn test_run_preserves_emission_order() {
        let (log, make) = recorder();
        let mut dispatcher = EventDispatcher::new();
        for kind in EventKind::ALL {
            dispatcher.subscribe(kind, make("all"));
        }

        let (sender, receiver) = create_transport_event_channel(&ChannelConfig::default());
        let events = vec![
            TransportEvent::NewRoom {
                entity: Entity::room("general", "General"),
            },
            TransportEvent::NewConversation {
                entity: Entity::conversation("bob", "Bob"),
            },
            TransportEvent::AuthenticateRequired,
            TransportEvent::Disconnected {
                reason: "bye".into(),
            },
        ];
        for event in events {
            sender.send(event).await.unwrap();
        }
        drop(sender);

        let stats = dispatcher.run(receiver).await;
        assert_eq!(stats.events_dispatched, 4);
        assert_eq!(stats.deliveries, 4);
        assert_eq!(
            *log.lock(),
            vec![
                "all:new-room",
                "all:new-conversation",
                "all:authenticate",
                "all:disconnected"
            ]
        );
    }
}
