//! Transport handles and the provider seam used by the reconnecting client.
//!
//! A [`Transport`] is the owner-side handle of one connection attempt: it can
//! be written to and destroyed, and it carries the stream of
//! [`TransportEvent`]s produced by the provider. The provider side is a
//! [`TransportIo`], obtained together with the handle from [`pair`]. Whoever
//! drives the actual socket (the TCP and TLS connectors in this crate, or an
//! in-memory test double) reports `Connected`, `Data`, `Error` and `Closed`
//! through it.
//!
//! Every transport reports `Closed` exactly once: dropping the `TransportIo`
//! emits it if [`TransportIo::close`] was not called explicitly.
//!
//! # Writing a Connector
//!
//! ```ignore
//! use tether_net::transport::{self, Connector, Transport};
//! use tether_net::{Endpoint, Result};
//!
//! struct LoopbackConnector;
//!
//! impl Connector for LoopbackConnector {
//!     fn connect(&self, endpoint: &Endpoint) -> Result<Transport> {
//!         let (transport, io) = transport::pair(endpoint.clone());
//!         tokio::spawn(async move {
//!             io.connected();
//!             // ... drive the connection, then drop `io` to report closure
//!         });
//!         Ok(transport)
//!     }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tether_core::logging::targets;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::endpoint::Endpoint;
use crate::error::{NetworkError, Result};

/// Unique identifier for a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// An event reported by a transport provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established.
    Connected,
    /// Bytes arrived from the peer.
    Data(Bytes),
    /// The transport failed. A `Closed` event follows.
    Error(NetworkError),
    /// The transport is closed. Always the last event.
    Closed,
}

/// A request from the transport owner to the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write these bytes to the peer.
    Write(Bytes),
    /// Tear the connection down immediately.
    Destroy,
}

struct TransportInner {
    id: TransportId,
    endpoint: Endpoint,
    commands: mpsc::UnboundedSender<TransportCommand>,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    destroyed: AtomicBool,
    closed: Arc<AtomicBool>,
}

/// Owner-side handle to a single connection.
///
/// Cloning is cheap; all clones refer to the same connection. A handle stays
/// valid after the connection closes, but writes to it fail.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

impl Transport {
    /// Get the unique transport ID.
    pub fn id(&self) -> TransportId {
        self.inner.id
    }

    /// Get the endpoint this transport was created for.
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Queue bytes for the peer.
    ///
    /// Fails with [`NetworkError::NotConnected`] once the transport has been
    /// destroyed or has reported its closure.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        if self.is_destroyed() || self.is_closed() {
            return Err(NetworkError::NotConnected);
        }
        self.inner
            .commands
            .send(TransportCommand::Write(data.into()))
            .map_err(|_| NetworkError::NotConnected)
    }

    /// Tear the connection down. Only the first call has an effect.
    ///
    /// The provider answers with a `Closed` event unless it already sent one.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::trace!(target: targets::TRANSPORT, id = %self.inner.id, "destroying transport");
        let _ = self.inner.commands.send(TransportCommand::Destroy);
    }

    /// Check whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Check whether the provider has reported `Closed`.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Take the event stream. Returns `None` if it was already taken.
    pub(crate) fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.inner.events.lock().take()
    }
}

impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Transport {}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("destroyed", &self.is_destroyed())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Provider-side half of a transport.
///
/// Reports events to the owner and receives its commands.
pub struct TransportIo {
    id: TransportId,
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
    closed: Arc<AtomicBool>,
}

impl TransportIo {
    /// Get the ID of the transport this half belongs to.
    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Report that the connection is established.
    pub fn connected(&self) {
        self.send(TransportEvent::Connected);
    }

    /// Report bytes received from the peer.
    pub fn data(&self, data: impl Into<Bytes>) {
        self.send(TransportEvent::Data(data.into()));
    }

    /// Report a failure. Closing remains a separate step.
    pub fn error(&self, error: NetworkError) {
        self.send(TransportEvent::Error(error));
    }

    /// Report closure and give up this half.
    pub fn close(self) {
        drop(self);
    }

    /// Wait for the next command from the owner.
    ///
    /// Returns `None` once every owner handle has been dropped.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        self.commands.recv().await
    }

    /// Get the next command if one is already queued.
    pub fn try_next_command(&mut self) -> Option<TransportCommand> {
        self.commands.try_recv().ok()
    }

    /// Wait until the owner destroys the transport or drops every handle.
    ///
    /// Writes queued before the connection is established are discarded.
    pub async fn destroyed(&mut self) {
        while let Some(command) = self.commands.recv().await {
            if command == TransportCommand::Destroy {
                return;
            }
        }
    }

    fn send(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for TransportIo {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::trace!(target: targets::TRANSPORT, id = %self.id, "transport closed");
            let _ = self.events.send(TransportEvent::Closed);
        }
    }
}

impl std::fmt::Debug for TransportIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportIo").field("id", &self.id).finish()
    }
}

/// Create a connected transport handle and its provider half.
pub fn pair(endpoint: Endpoint) -> (Transport, TransportIo) {
    let id = TransportId::next();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let transport = Transport {
        inner: Arc::new(TransportInner {
            id,
            endpoint,
            commands: command_tx,
            events: Mutex::new(Some(event_rx)),
            destroyed: AtomicBool::new(false),
            closed: closed.clone(),
        }),
    };

    let io = TransportIo {
        id,
        events: event_tx,
        commands: command_rx,
        closed,
    };

    (transport, io)
}

/// Produces transports for the reconnecting client.
///
/// `connect` runs on the client's timer task without the client lock held.
/// It should return promptly and leave the actual connection work to a
/// spawned task. An `Err` is treated as a synchronous connect failure.
pub trait Connector: Send + Sync + 'static {
    /// Produce a new transport for `endpoint`.
    fn connect(&self, endpoint: &Endpoint) -> Result<Transport>;
}

impl<F> Connector for F
where
    F: Fn(&Endpoint) -> Result<Transport> + Send + Sync + 'static,
{
    fn connect(&self, endpoint: &Endpoint) -> Result<Transport> {
        self(endpoint)
    }
}

/// Pump bytes between an established stream and the transport owner.
///
/// Returns when the peer closes, an I/O error occurs, or the owner destroys
/// the transport. The caller reports closure by dropping `io`.
pub(crate) async fn drive_stream<S>(stream: S, io: &mut TransportIo, read_buffer_size: usize)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buffer = vec![0u8; read_buffer_size.max(1)];

    loop {
        tokio::select! {
            command = io.next_command() => {
                match command {
                    Some(TransportCommand::Write(data)) => {
                        if let Err(e) = writer.write_all(&data).await {
                            io.error(NetworkError::Transport(e.to_string()));
                            break;
                        }
                    }
                    Some(TransportCommand::Destroy) | None => break,
                }
            }

            result = reader.read(&mut buffer) => {
                match result {
                    // EOF - peer closed the connection
                    Ok(0) => break,
                    Ok(n) => io.data(Bytes::copy_from_slice(&buffer[..n])),
                    Err(e) => {
                        io.error(NetworkError::Transport(e.to_string()));
                        break;
                    }
                }
            }
        }
    }
}
