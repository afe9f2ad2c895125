//! Listening server that hands accepted connections to a handler.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::logging::targets;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;

use super::connection::TcpConnection;
use crate::config::{NetServerConfig, TcpSocketConfig};
use crate::error::{NetworkError, Result};
use crate::stop::StopFuture;

/// Receives every connection accepted by a [`NetServer`].
///
/// `on_new_client` runs on the accept task before the connection starts
/// delivering events, so signal handlers connected inside it observe all
/// data from the first byte. It must not block.
pub trait ClientHandler: Send + Sync + 'static {
    /// Take charge of a newly accepted connection.
    fn on_new_client(&self, connection: Arc<TcpConnection>);
}

impl<F> ClientHandler for F
where
    F: Fn(Arc<TcpConnection>) + Send + Sync + 'static,
{
    fn on_new_client(&self, connection: Arc<TcpConnection>) {
        self(connection)
    }
}

struct ServerInner {
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

/// A TCP server that forwards each accepted connection to a [`ClientHandler`].
///
/// The server keeps no per-connection state: once the handler has been
/// called, the connection belongs to whoever holds its `Arc`.
///
/// # Example
///
/// ```ignore
/// let server = NetServer::new(8080, Some("ingest"), |conn: Arc<TcpConnection>| {
///     let peer = conn.peer_addr();
///     conn.data_received.connect(move |data| {
///         println!("Received from {}: {} bytes", peer, data.len());
///     });
/// });
///
/// server.start()?;
/// // ... later
/// server.stop().await;
/// ```
pub struct NetServer<H: ClientHandler> {
    config: NetServerConfig,
    handler: Arc<H>,
    inner: Mutex<ServerInner>,
}

impl<H: ClientHandler> NetServer<H> {
    /// Create a server listening on all interfaces on `port`.
    pub fn new(port: u16, name: Option<&str>, handler: H) -> Self {
        let mut config = NetServerConfig::new(port);
        if let Some(name) = name {
            config.name = name.to_string();
        }
        Self::with_config(config, handler)
    }

    /// Create a server from a full configuration.
    pub fn with_config(config: NetServerConfig, handler: H) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            inner: Mutex::new(ServerInner {
                accept_task: None,
                local_addr: None,
            }),
        }
    }

    /// Bind, listen and start accepting connections.
    ///
    /// Binding happens before this returns, so bind failures are reported
    /// here. Must be called from within a tokio runtime. If the server is
    /// already listening, this is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.accept_task.is_some() {
            return Ok(());
        }

        let name = self.config.name.clone();
        tracing::trace!(target: targets::SERVER, server = %name, bind = %self.config.bind_addr(), "Starting");

        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;

        tracing::info!(target: targets::SERVER, server = %name, "Listening on port {}", local_addr.port());

        inner.local_addr = Some(local_addr);
        inner.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            local_addr,
            name,
            self.config.socket.clone(),
            self.handler.clone(),
        )));
        Ok(())
    }

    fn bind(&self) -> Result<TcpListener> {
        let bind_addr = self.config.bind_addr();
        let addr = bind_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| NetworkError::Io(format!("No address to bind for {bind_addr}")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        Ok(socket.listen(self.config.backlog)?)
    }

    /// Close the listening socket.
    ///
    /// The returned future is already complete. Accepted connections are
    /// left running; close them through their own handles.
    pub fn stop(&self) -> StopFuture {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.accept_task.take() {
            task.abort();
            inner.local_addr = None;
            tracing::trace!(target: targets::SERVER, server = %self.config.name, "Stopped");
        }
        StopFuture::ready()
    }

    /// Check if the server is listening.
    pub fn is_listening(&self) -> bool {
        self.inner.lock().accept_task.is_some()
    }

    /// Get the bound address while listening.
    ///
    /// Useful when binding to port 0 to learn the assigned port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().local_addr
    }

    /// Get the name used in log output.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the handler receiving new connections.
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

async fn accept_loop<H: ClientHandler>(
    listener: TcpListener,
    local_addr: SocketAddr,
    name: String,
    socket: TcpSocketConfig,
    handler: Arc<H>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if let Err(e) = socket.apply(&stream) {
                    tracing::warn!(target: targets::SERVER, server = %name, peer = %peer_addr, "Failed to apply socket options: {e}");
                }

                let (connection, io) = TcpConnection::new(local_addr, peer_addr);
                tracing::trace!(target: targets::SERVER, server = %name, peer = %peer_addr, id = %connection.id(), "New client");

                handler.on_new_client(connection.clone());
                connection.spawn_io(stream, io, socket.read_buffer_size);
            }
            Err(e) => {
                tracing::warn!(target: targets::SERVER, server = %name, "Accept error: {e}");
            }
        }
    }
}

impl<H: ClientHandler> Drop for NetServer<H> {
    fn drop(&mut self) {
        if let Some(task) = self.inner.get_mut().accept_task.take() {
            task.abort();
        }
    }
}

impl<H: ClientHandler> std::fmt::Debug for NetServer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetServer")
            .field("name", &self.config.name)
            .field("bind_addr", &self.config.bind_addr())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
