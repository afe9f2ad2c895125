//! Connection type for server-accepted clients.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tether_core::Signal;
use tether_core::logging::targets;
use tokio::net::TcpStream;

use crate::endpoint::Endpoint;
use crate::error::{NetworkError, Result};
use crate::transport::{self, Transport, TransportEvent, TransportId, TransportIo};

/// A TCP connection from an accepted client.
///
/// Each accepted socket gets its own `TcpConnection`, with its own transport
/// and signals; connections never share state with each other or with the
/// server that accepted them.
///
/// # Signals
///
/// - [`data_received`](Self::data_received): Emitted when data is received
/// - [`disconnected`](Self::disconnected): Emitted once, when the connection is closed
/// - [`error`](Self::error): Emitted when an I/O error occurs
pub struct TcpConnection {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    transport: Transport,

    /// Signal emitted when data is received.
    pub data_received: Signal<Bytes>,
    /// Signal emitted when the connection is closed.
    pub disconnected: Signal<()>,
    /// Signal emitted when an error occurs.
    pub error: Signal<NetworkError>,
}

impl TcpConnection {
    /// Wrap an accepted socket. No I/O happens until [`spawn_io`](Self::spawn_io).
    pub(crate) fn new(local_addr: SocketAddr, peer_addr: SocketAddr) -> (Arc<Self>, TransportIo) {
        let endpoint = Endpoint::new(peer_addr.ip().to_string(), peer_addr.port());
        let (transport, io) = transport::pair(endpoint);

        let connection = Arc::new(Self {
            local_addr,
            peer_addr,
            transport,
            data_received: Signal::new(),
            disconnected: Signal::new(),
            error: Signal::new(),
        });

        (connection, io)
    }

    /// Start pumping the socket and delivering its events to the signals.
    pub(crate) fn spawn_io(
        self: &Arc<Self>,
        stream: TcpStream,
        mut io: TransportIo,
        read_buffer_size: usize,
    ) {
        let Some(mut events) = self.transport.take_events() else {
            return;
        };
        let connection = self.clone();

        tokio::spawn(async move {
            let drive = async move {
                transport::drive_stream(stream, &mut io, read_buffer_size).await;
                io.close();
            };

            let dispatch = async {
                while let Some(event) = events.recv().await {
                    match event {
                        TransportEvent::Connected => {}
                        TransportEvent::Data(data) => connection.data_received.emit(data),
                        TransportEvent::Error(err) => {
                            tracing::warn!(
                                target: targets::SERVER,
                                id = %connection.id(),
                                peer = %connection.peer_addr,
                                "{err}"
                            );
                            connection.error.emit(err);
                        }
                        TransportEvent::Closed => {
                            tracing::trace!(
                                target: targets::SERVER,
                                id = %connection.id(),
                                peer = %connection.peer_addr,
                                "client disconnected"
                            );
                            connection.disconnected.emit(());
                            break;
                        }
                    }
                }
            };

            tokio::join!(drive, dispatch);
        });
    }

    /// Get the unique connection ID.
    pub fn id(&self) -> TransportId {
        self.transport.id()
    }

    /// Get the local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the peer socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the underlying transport handle.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Check if the connection is still active.
    pub fn is_connected(&self) -> bool {
        !self.transport.is_destroyed() && !self.transport.is_closed()
    }

    /// Send data to the peer.
    ///
    /// Returns `Ok(())` if the data was queued for sending, or
    /// [`NetworkError::NotConnected`] once the connection is closed.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        self.transport.write(data)
    }

    /// Close the connection.
    pub fn close(&self) {
        self.transport.destroy();
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("id", &self.id())
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("is_connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_new_connection_is_connected() {
        let (connection, _io) = TcpConnection::new(addr(9000), addr(50123));

        assert!(connection.is_connected());
        assert_eq!(connection.peer_addr(), addr(50123));
        assert_eq!(connection.transport().endpoint().port, 50123);
    }

    #[test]
    fn test_close_rejects_sends() {
        let (connection, _io) = TcpConnection::new(addr(9000), addr(50124));

        connection.close();

        assert!(!connection.is_connected());
        assert_eq!(
            connection.send(&b"late"[..]),
            Err(NetworkError::NotConnected)
        );
    }
}
