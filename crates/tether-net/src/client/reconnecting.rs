//! Reconnecting client with signal-based event delivery.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tether_core::Signal;
use tether_core::logging::{peer_label, targets};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::state::ClientState;
use crate::config::NetClientConfig;
use crate::endpoint::Endpoint;
use crate::error::{NetworkError, Result};
use crate::stop::{StopFuture, StopResolver};
use crate::transport::{Connector, Transport, TransportEvent};

/// A `stop()` call waiting for the owned transport to close.
struct PendingStop {
    resolver: StopResolver,
    future: StopFuture,
}

/// Mutable lifecycle state, guarded by one lock.
struct CoreState {
    endpoint: Endpoint,
    transport: Option<Transport>,
    /// Incremented for every installed transport; events carry the value
    /// they were wired with so stale ones are dropped.
    generation: u64,
    event_task: Option<JoinHandle<()>>,
    /// Set once the close of the current transport has been processed.
    close_handled: bool,
    is_connected: bool,
    is_started: bool,
    reconnect_timer: Option<JoinHandle<()>>,
    /// Identifies the most recently scheduled timer.
    timer_token: u64,
    stop: Option<PendingStop>,
}

impl CoreState {
    fn client_state(&self) -> ClientState {
        if self.stop.is_some() {
            ClientState::Stopping
        } else if !self.is_started {
            ClientState::Idle
        } else if self.is_connected {
            ClientState::Connected
        } else {
            ClientState::Connecting
        }
    }
}

struct Shared<C> {
    me: Weak<Shared<C>>,
    connector: C,
    name: Option<String>,
    reconnect_delay: Duration,
    state: Mutex<CoreState>,
    connected: Arc<Signal<Transport>>,
    disconnected: Arc<Signal<()>>,
    data: Arc<Signal<Bytes>>,
}

impl<C: Connector> Shared<C> {
    fn label(&self, state: &CoreState) -> String {
        peer_label(self.name.as_deref(), &state.endpoint)
    }

    /// Schedule a connect attempt unless one is already pending.
    fn schedule_reconnect(&self, state: &mut CoreState) {
        if state.reconnect_timer.is_some() {
            return;
        }

        state.timer_token += 1;
        let token = state.timer_token;
        let me = self.me.clone();
        let delay = self.reconnect_delay;
        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = me.upgrade() {
                shared.on_reconnect_timer(token);
            }
        }));
    }

    fn on_reconnect_timer(&self, token: u64) {
        let (endpoint, label) = {
            let mut state = self.state.lock();
            if state.reconnect_timer.is_none() || state.timer_token != token {
                // Cancelled while waiting for the lock.
                return;
            }

            // Cleared before connecting so a failure path may schedule again.
            state.reconnect_timer = None;

            if state.stop.is_some() || !state.is_started {
                return;
            }
            (state.endpoint.clone(), self.label(&state))
        };

        tracing::trace!(target: targets::CLIENT, client = %label, "Connecting");

        let result = self.connector.connect(&endpoint);

        let mut state = self.state.lock();
        let superseded = state.timer_token != token
            || state.reconnect_timer.is_some()
            || state.stop.is_some()
            || !state.is_started;

        match result {
            Ok(transport) if superseded => {
                tracing::trace!(target: targets::CLIENT, client = %label, "Discarding superseded attempt");
                transport.destroy();
            }
            Ok(transport) => {
                self.install(&mut state, transport);
                if state.endpoint != endpoint {
                    // The endpoint changed while connecting.
                    self.reset_locked(&state);
                }
            }
            // No retry is scheduled here; a later close event, reset or
            // restart is needed to try again.
            Err(err) => {
                tracing::error!(target: targets::CLIENT, client = %label, "Failed to connect: {err}");
            }
        }
    }

    /// Make `transport` the owned transport and wire its events.
    fn install(&self, state: &mut CoreState, transport: Transport) {
        let Some(events) = transport.take_events() else {
            tracing::error!(
                target: targets::CLIENT,
                client = %self.label(state),
                id = %transport.id(),
                "Failed to connect: transport events already taken"
            );
            transport.destroy();
            return;
        };

        state.generation += 1;
        let generation = state.generation;

        if let Some(task) = state.event_task.take() {
            task.abort();
        }
        state.is_connected = false;
        state.close_handled = false;
        state.transport = Some(transport);
        state.event_task = Some(tokio::spawn(Self::pump_events(
            self.me.clone(),
            generation,
            events,
        )));
    }

    async fn pump_events(
        me: Weak<Shared<C>>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = events.recv().await {
            let closed = event == TransportEvent::Closed;
            match me.upgrade() {
                Some(shared) => shared.handle_event(generation, event),
                None => return,
            }
            if closed {
                return;
            }
        }
    }

    fn handle_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.handle_connect(generation),
            TransportEvent::Data(data) => {
                if self.state.lock().generation == generation {
                    self.data.emit(data);
                }
            }
            TransportEvent::Error(err) => {
                let state = self.state.lock();
                if state.generation == generation {
                    tracing::warn!(target: targets::CLIENT, client = %self.label(&state), "{err}");
                }
            }
            TransportEvent::Closed => self.handle_close(generation),
        }
    }

    fn handle_connect(&self, generation: u64) {
        let transport = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            tracing::info!(target: targets::CLIENT, client = %self.label(&state), "Connected");
            state.is_connected = true;
            state.transport.clone()
        };

        if let Some(transport) = transport {
            self.connected.emit(transport);
        }
    }

    fn handle_close(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.is_connected = false;
        }

        self.disconnected.emit(());

        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.close_handled = true;

        if let Some(pending) = state.stop.take() {
            state.is_started = false;
            if let Some(timer) = state.reconnect_timer.take() {
                timer.abort();
            }
            tracing::trace!(target: targets::CLIENT, client = %self.label(&state), "Stopped");
            drop(state);
            pending.resolver.resolve();
        } else if state.is_started {
            tracing::warn!(
                target: targets::CLIENT,
                client = %self.label(&state),
                "Connection closed. Reconnecting..."
            );
            self.schedule_reconnect(&mut state);
        }
    }

    fn reset_locked(&self, state: &CoreState) {
        tracing::trace!(target: targets::CLIENT, client = %self.label(state), "Resetting");
        if let Some(transport) = &state.transport {
            transport.destroy();
        }
    }

    /// Tear everything down when the owning client is dropped.
    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.is_started = false;
        state.is_connected = false;
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(task) = state.event_task.take() {
            task.abort();
        }
        if let Some(transport) = state.transport.take() {
            transport.destroy();
        }
        if let Some(pending) = state.stop.take() {
            pending.resolver.resolve();
        }
    }
}

/// A client that keeps one connection to an endpoint alive.
///
/// After [`start`](Self::start) the client connects to its endpoint after the
/// configured reconnect delay and reconnects the same way after every
/// disconnect, until [`stop`](Self::stop) is called. The way a connection is
/// produced is delegated to a [`Connector`]; [`NetClient`](super::NetClient)
/// and [`TlsNetClient`](super::TlsNetClient) are the plain TCP and TLS
/// variants.
///
/// All methods must be called from within a tokio runtime.
///
/// # Signals
///
/// - [`connected`](Self::connected): Emitted with the transport when a connection is established
/// - [`disconnected`](Self::disconnected): Emitted whenever the current transport closes
/// - [`data`](Self::data): Emitted with received bytes, in arrival order
///
/// # Example
///
/// ```ignore
/// let client = NetClient::new("127.0.0.1", 8080, Some("telemetry"));
///
/// client.connected.connect(|_| println!("Connected!"));
/// client.data.connect(|data| println!("Received {} bytes", data.len()));
///
/// client.start();
/// // ... later
/// client.stop().await;
/// ```
pub struct ReconnectingClient<C: Connector> {
    shared: Arc<Shared<C>>,

    /// Signal emitted with the transport when a connection is established.
    pub connected: Arc<Signal<Transport>>,
    /// Signal emitted when the current transport closes, for any reason.
    pub disconnected: Arc<Signal<()>>,
    /// Signal emitted when data is received.
    pub data: Arc<Signal<Bytes>>,
}

impl<C: Connector> ReconnectingClient<C> {
    /// Create a client that obtains its transports from `connector`.
    pub fn with_connector(config: NetClientConfig, connector: C) -> Self {
        let connected = Arc::new(Signal::new());
        let disconnected = Arc::new(Signal::new());
        let data = Arc::new(Signal::new());

        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            connector,
            name: config.name,
            reconnect_delay: config.reconnect_delay,
            state: Mutex::new(CoreState {
                endpoint: Endpoint::new(config.host, config.port),
                transport: None,
                generation: 0,
                event_task: None,
                close_handled: false,
                is_connected: false,
                is_started: false,
                reconnect_timer: None,
                timer_token: 0,
                stop: None,
            }),
            connected: connected.clone(),
            disconnected: disconnected.clone(),
            data: data.clone(),
        });

        Self {
            shared,
            connected,
            disconnected,
            data,
        }
    }

    /// Start connecting. Does nothing if the client is already started.
    pub fn start(&self) {
        let mut state = self.shared.state.lock();
        if state.is_started {
            return;
        }

        tracing::trace!(target: targets::CLIENT, client = %self.shared.label(&state), "Starting");

        state.is_started = true;
        self.shared.schedule_reconnect(&mut state);
    }

    /// Stop the client and close the current connection.
    ///
    /// The returned future resolves once the transport has confirmed its
    /// closure; at that point [`is_started`](Self::is_started) is `false` and
    /// no reconnect is pending. Calling `stop` while a stop is in progress
    /// returns the same future. Calling it on a client that is not started
    /// returns a future that is already complete.
    pub fn stop(&self) -> StopFuture {
        let mut state = self.shared.state.lock();
        if !state.is_started {
            return StopFuture::ready();
        }
        if let Some(pending) = &state.stop {
            return pending.future.clone();
        }

        let label = self.shared.label(&state);
        tracing::trace!(target: targets::CLIENT, client = %label, "Stopping");

        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }

        // A transport whose close has not been processed yet always delivers
        // its close event, even if the socket is already gone.
        match state.transport.as_ref().filter(|_| !state.close_handled) {
            Some(transport) => {
                transport.destroy();
                let (resolver, future) = StopFuture::pending();
                state.stop = Some(PendingStop {
                    resolver,
                    future: future.clone(),
                });
                future
            }
            // Nothing left to close: no close event will arrive.
            None => {
                state.is_started = false;
                tracing::trace!(target: targets::CLIENT, client = %label, "Stopped");
                StopFuture::ready()
            }
        }
    }

    /// Check if the client is started.
    pub fn is_started(&self) -> bool {
        self.shared.state.lock().is_started
    }

    /// Check if the client is connected.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.shared.state.lock().client_state()
    }

    /// Force the current connection closed.
    ///
    /// Start/stop state is untouched; a started client reconnects after the
    /// close, picking up the current endpoint.
    pub fn reset(&self) {
        let state = self.shared.state.lock();
        self.shared.reset_locked(&state);
    }

    /// Send data to the peer.
    ///
    /// Fails with [`NetworkError::NotConnected`] if no connection is
    /// established. Data is handed to the transport as is; nothing is queued
    /// while disconnected.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let state = self.shared.state.lock();
        if !state.is_connected {
            return Err(NetworkError::NotConnected);
        }
        match &state.transport {
            Some(transport) => transport.write(data),
            None => Err(NetworkError::NotConnected),
        }
    }

    /// Get the host this client connects to.
    pub fn host(&self) -> String {
        self.shared.state.lock().endpoint.host.clone()
    }

    /// Change the host and force a reconnect to it.
    pub fn set_host(&self, host: impl Into<String>) {
        let host = host.into();
        let mut state = self.shared.state.lock();
        tracing::trace!(
            target: targets::CLIENT,
            client = %self.shared.label(&state),
            "Host changed from {} to {} --> Resetting",
            state.endpoint.host,
            host
        );
        state.endpoint.host = host;
        self.shared.reset_locked(&state);
    }

    /// Get the port this client connects to.
    pub fn port(&self) -> u16 {
        self.shared.state.lock().endpoint.port
    }

    /// Change the port and force a reconnect to it.
    pub fn set_port(&self, port: u16) {
        let mut state = self.shared.state.lock();
        tracing::trace!(
            target: targets::CLIENT,
            client = %self.shared.label(&state),
            "Port changed from {} to {} --> Resetting",
            state.endpoint.port,
            port
        );
        state.endpoint.port = port;
        self.shared.reset_locked(&state);
    }

    /// Get the endpoint this client connects to.
    pub fn endpoint(&self) -> Endpoint {
        self.shared.state.lock().endpoint.clone()
    }

    /// Get the name used in log output.
    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// Get the currently owned transport.
    ///
    /// The transport is replaced on every reconnect; do not hold on to it
    /// expecting it to follow the client.
    pub fn raw_transport(&self) -> Option<Transport> {
        self.shared.state.lock().transport.clone()
    }

    /// Get the connector used to produce transports.
    pub fn connector(&self) -> &C {
        &self.shared.connector
    }
}

impl<C: Connector> Drop for ReconnectingClient<C> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl<C: Connector> std::fmt::Debug for ReconnectingClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ReconnectingClient")
            .field("name", &self.shared.name)
            .field("endpoint", &state.endpoint)
            .field("state", &state.client_state())
            .finish()
    }
}
