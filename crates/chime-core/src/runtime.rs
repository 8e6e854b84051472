//! Client Runtime
//!
//! Wires the session core together for UI and CLI callers:
//!
//! - the transport pushes events into a bounded channel
//! - a single runtime task drains that channel through the `EventDispatcher`,
//!   which feeds the `SessionManager` and the `SharedRoster`
//! - the same task sleeps until the manager's next deadline and fires its
//!   timers, so backoff delays never block event delivery
//! - callers drive the session through a `ClientHandle`
//!
//! ```rust,no_run
//! use chime_core::{ClientBuilder, MemoryCredentialStore, ScriptedTransport, TransportScript};
//!
//! # #[tokio::main]
//! # async fn main() -> chime_core::Result<()> {
//! let mut client = ClientBuilder::new()
//!     .with_store(MemoryCredentialStore::new())
//!     .with_transport(ScriptedTransport::new(TransportScript::default()))
//!     .build_and_start()
//!     .await?;
//!
//! client.connect()?;
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::channel::{
    create_transport_event_channel, EventKind, LogLevel, TransportEvent, TransportEventReceiver,
};
use crate::config::ChimeConfig;
use crate::credentials::CredentialStore;
use crate::dispatcher::{DispatchStats, EventDispatcher};
use crate::errors::{ChimeError, Result};
use crate::roster::SharedRoster;
use crate::session::{SessionManager, SessionSnapshot, SessionState, SessionUpdate};
use crate::transport::ConnectionTransport;
use crate::types::{SystemTimeSource, TimeSource};

type Manager = SessionManager<Box<dyn TimeSource>>;

/// State shared between the handle and the runtime task
struct Shared {
    manager: Mutex<Manager>,
    roster: SharedRoster,
    /// Signalled when a command may have changed the manager's deadlines
    wake: Notify,
    running: AtomicBool,
}

// ----------------------------------------------------------------------------
// Client Builder
// ----------------------------------------------------------------------------

/// Builder for a running client session
pub struct ClientBuilder {
    config: ChimeConfig,
    store: Option<Box<dyn CredentialStore>>,
    transport: Option<Box<dyn ConnectionTransport>>,
    clock: Box<dyn TimeSource>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ChimeConfig::default(),
            store: None,
            transport: None,
            clock: Box::new(SystemTimeSource),
        }
    }

    pub fn with_config(mut self, config: ChimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store<S: CredentialStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_boxed_store(mut self, store: Box<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport<T: ConnectionTransport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn with_clock<C: TimeSource + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Validate, wire the components and spawn the runtime task
    pub async fn build_and_start(self) -> Result<ClientHandle> {
        self.config.validate().map_err(ChimeError::config_error)?;
        let store = self
            .store
            .ok_or_else(|| ChimeError::config_error("No credential store configured"))?;
        let mut transport = self
            .transport
            .ok_or_else(|| ChimeError::config_error("No transport configured"))?;

        let (event_sender, event_receiver) = create_transport_event_channel(&self.config.channels);
        transport.attach_events(event_sender);

        let manager = SessionManager::new(&self.config, store, transport, self.clock);
        let shared = Arc::new(Shared {
            manager: Mutex::new(manager),
            roster: SharedRoster::new(),
            wake: Notify::new(),
            running: AtomicBool::new(true),
        });

        let dispatcher = wire_dispatcher(&shared);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let task = tokio::spawn(run_client_task(
            shared.clone(),
            dispatcher,
            event_receiver,
            shutdown_receiver,
        ));

        info!("Client runtime started");
        Ok(ClientHandle {
            shared,
            shutdown: Some(shutdown_sender),
            task: Some(task),
        })
    }
}

/// Route session kinds to the manager, roster kinds to the roster and
/// transport log lines to tracing
fn wire_dispatcher(shared: &Arc<Shared>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();

    for kind in EventKind::SESSION.into_iter().chain([EventKind::Progress]) {
        let shared = shared.clone();
        dispatcher.subscribe(kind, move |event| {
            shared.manager.lock().handle_event(event);
        });
    }

    for kind in EventKind::ROSTER {
        let roster = shared.roster.clone();
        dispatcher.subscribe(kind, move |event| roster.apply_event(event));
    }

    dispatcher.subscribe(EventKind::LogMessage, |event| {
        if let TransportEvent::LogMessage { level, text } = event {
            log_transport_message(*level, text);
        }
    });

    dispatcher
}

fn log_transport_message(level: LogLevel, text: &str) {
    match level {
        LogLevel::Trace => trace!(target: "chime::transport", "{}", text),
        LogLevel::Debug => debug!(target: "chime::transport", "{}", text),
        LogLevel::Info => info!(target: "chime::transport", "{}", text),
        LogLevel::Warn => warn!(target: "chime::transport", "{}", text),
        LogLevel::Error => error!(target: "chime::transport", "{}", text),
    }
}

// ----------------------------------------------------------------------------
// Runtime Task
// ----------------------------------------------------------------------------

async fn run_client_task(
    shared: Arc<Shared>,
    mut dispatcher: EventDispatcher,
    mut events: TransportEventReceiver,
    mut shutdown: oneshot::Receiver<()>,
) -> DispatchStats {
    debug!("Client runtime task starting");

    loop {
        let wait = shared.manager.lock().time_until_next_deadline();
        let timer = async move {
            match wait {
                Some(wait) => tokio::time::sleep(wait).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = &mut shutdown => {
                debug!("Shutdown requested");
                // Deliver what the transport already queued
                while let Ok(event) = events.try_recv() {
                    dispatcher.dispatch(&event);
                }
                break;
            }

            event = events.recv() => match event {
                Some(event) => {
                    dispatcher.dispatch(&event);
                }
                None => {
                    info!("Transport event channel closed, stopping client runtime");
                    break;
                }
            },

            _ = timer => {
                shared.manager.lock().poll_timers();
            }

            // A command moved the deadlines; loop to recompute the timer
            _ = shared.wake.notified() => {}
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    let stats = dispatcher.stats();
    debug!(?stats, "Client runtime task stopped");
    stats
}

// ----------------------------------------------------------------------------
// Client Handle
// ----------------------------------------------------------------------------

/// Handle to a running client session
pub struct ClientHandle {
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<DispatchStats>>,
}

impl ClientHandle {
    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(ChimeError::channel_error("Client runtime is not running"))
        }
    }

    fn command<T>(&self, op: impl FnOnce(&mut Manager) -> T) -> Result<T> {
        self.ensure_running()?;
        let result = {
            let mut manager = self.shared.manager.lock();
            op(&mut *manager)
        };
        self.shared.wake.notify_one();
        Ok(result)
    }

    /// Start a new attempt chain
    ///
    /// The roster is emptied once a new session has actually started; a
    /// rejected connect leaves it untouched.
    pub fn connect(&self) -> Result<()> {
        let roster = self.shared.roster.clone();
        self.command(|manager| {
            if manager.state().accepts_connect() {
                roster.clear_on_success(|| manager.connect())
            } else {
                manager.connect()
            }
        })?
    }

    pub fn submit_credentials(&self, username: &str, password: &str) -> Result<()> {
        self.command(|manager| manager.submit_credentials(username, password))?
    }

    pub fn cancel(&self) -> Result<bool> {
        self.command(|manager| manager.cancel())
    }

    /// Close the session, clear stored credentials and empty the roster
    pub fn sign_out(&self) -> Result<()> {
        self.command(|manager| manager.sign_out())??;
        self.shared.roster.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.manager.lock().snapshot()
    }

    pub fn roster(&self) -> SharedRoster {
        self.shared.roster.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.shared.manager.lock().subscribe()
    }

    pub fn audit_trail(&self, limit: usize) -> Vec<crate::session::TransitionRecord> {
        self.shared.manager.lock().audit_trail(limit)
    }

    /// Wait until the session enters a state matching `predicate`
    ///
    /// Returns `None` if `timeout` elapses first.
    pub async fn wait_for<P>(&self, timeout: Duration, mut predicate: P) -> Option<SessionSnapshot>
    where
        P: FnMut(&SessionState) -> bool,
    {
        // Subscribe before looking so no transition slips between the two
        let mut updates = self.subscribe();
        let current = self.snapshot();
        if predicate(&current.state) {
            return Some(current);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, updates.recv()).await {
                Ok(Ok(SessionUpdate::Transition { state, .. })) => {
                    if predicate(&state) {
                        return Some(SessionSnapshot {
                            state,
                            ..self.snapshot()
                        });
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!(skipped, "Session updates lagged, re-reading state");
                    let current = self.snapshot();
                    if predicate(&current.state) {
                        return Some(current);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stop the runtime task and return its dispatch statistics
    pub async fn shutdown(&mut self) -> Result<DispatchStats> {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }

        let stats = match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| ChimeError::channel_error(format!("Client task failed: {}", e)))?,
            None => DispatchStats::default(),
        };

        self.shared.running.store(false, Ordering::SeqCst);
        info!("Client runtime stopped");
        Ok(stats)
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if let Some(sender) = self.shutdown.take() {
            let _ = sender.send(());
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPresets;
    use crate::credentials::MemoryCredentialStore;
    use crate::transport::{ScriptedTransport, TransportScript};

    #[tokio::test]
    async fn test_build_requires_store_and_transport() {
        let result = ClientBuilder::new()
            .with_transport(ScriptedTransport::new(TransportScript::default()))
            .build_and_start()
            .await;
        assert!(matches!(result, Err(ChimeError::Configuration { .. })));

        let result = ClientBuilder::new()
            .with_store(MemoryCredentialStore::new())
            .build_and_start()
            .await;
        assert!(matches!(result, Err(ChimeError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = ConfigPresets::testing();
        config.channels.transport_event_buffer_size = 0;
        let result = ClientBuilder::new()
            .with_config(config)
            .with_store(MemoryCredentialStore::new())
            .with_transport(ScriptedTransport::new(TransportScript::default()))
            .build_and_start()
            .await;
        assert!(matches!(result, Err(ChimeError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_rejected_connect_keeps_roster() {
        let mut client = ClientBuilder::new()
            .with_config(ConfigPresets::testing())
            .with_store(MemoryCredentialStore::new())
            .with_transport(ScriptedTransport::new(TransportScript::default()))
            .build_and_start()
            .await
            .unwrap();
        client
            .roster()
            .on_entity_added(crate::roster::Entity::room("general", "General"))
            .unwrap();

        assert!(matches!(
            client.connect(),
            Err(ChimeError::MissingCredentials { .. })
        ));
        assert_eq!(client.snapshot().state, SessionState::Idle);
        assert_eq!(client.roster().len(), 1);

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_fail_after_shutdown() {
        let mut client = ClientBuilder::new()
            .with_config(ConfigPresets::testing())
            .with_store(MemoryCredentialStore::new())
            .with_transport(ScriptedTransport::new(TransportScript::default()))
            .build_and_start()
            .await
            .unwrap();
        assert!(client.is_running());

        // No credentials stored
        assert!(matches!(
            client.connect(),
            Err(ChimeError::MissingCredentials { .. })
        ));

        let stats = client.shutdown().await.unwrap();
        assert_eq!(stats.events_dispatched, 0);
        assert!(!client.is_running());
        assert!(matches!(client.connect(), Err(ChimeError::Channel { .. })));
    }
}
