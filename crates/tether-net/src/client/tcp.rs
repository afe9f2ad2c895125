//! Plain TCP client variant.

use tether_core::logging::targets;
use tokio::net::TcpStream;

use super::reconnecting::ReconnectingClient;
use crate::config::{NetClientConfig, TcpSocketConfig};
use crate::endpoint::Endpoint;
use crate::error::{NetworkError, Result};
use crate::transport::{self, Connector, Transport, TransportIo};

/// Produces plain TCP transports.
///
/// Keep-alive is enabled with a zero initial delay unless the socket
/// configuration says otherwise.
#[derive(Clone, Debug, Default)]
pub struct TcpConnector {
    socket: TcpSocketConfig,
}

impl TcpConnector {
    /// Create a connector applying `socket` options to every connection.
    pub fn new(socket: TcpSocketConfig) -> Self {
        Self { socket }
    }

    /// Get the socket options applied to new connections.
    pub fn socket_config(&self) -> &TcpSocketConfig {
        &self.socket
    }
}

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Transport> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NetworkError::Connect(e.to_string()))?;

        let (transport, io) = transport::pair(endpoint.clone());
        runtime.spawn(run(endpoint.address(), self.socket.clone(), io));
        Ok(transport)
    }
}

/// Connect, then pump the stream until it closes. Dropping `io` at the end
/// reports the closure.
async fn run(address: String, socket: TcpSocketConfig, mut io: TransportIo) {
    let Some(stream) = connect_tcp(&address, &socket, &mut io).await else {
        return;
    };

    io.connected();
    transport::drive_stream(stream, &mut io, socket.read_buffer_size).await;
}

/// Open a TCP connection unless the owner destroys the transport first.
///
/// Failures are reported through `io`; `None` means the attempt is over.
pub(crate) async fn connect_tcp(
    address: &str,
    socket: &TcpSocketConfig,
    io: &mut TransportIo,
) -> Option<TcpStream> {
    let stream = tokio::select! {
        result = TcpStream::connect(address) => match result {
            Ok(stream) => stream,
            Err(e) => {
                io.error(NetworkError::Connect(e.to_string()));
                return None;
            }
        },
        _ = io.destroyed() => return None,
    };

    if let Err(e) = socket.apply(&stream) {
        tracing::warn!(target: targets::TRANSPORT, %address, "Failed to apply socket options: {e}");
    }

    Some(stream)
}

/// A reconnecting plain TCP client.
pub type NetClient = ReconnectingClient<TcpConnector>;

impl ReconnectingClient<TcpConnector> {
    /// Create a TCP client for `host:port`.
    ///
    /// `name` is only used to label log output.
    pub fn new(host: impl Into<String>, port: u16, name: Option<&str>) -> Self {
        let mut config = NetClientConfig::new(host, port);
        config.name = name.map(str::to_string);
        Self::with_config(config)
    }

    /// Create a TCP client from a full configuration.
    pub fn with_config(config: NetClientConfig) -> Self {
        let connector = TcpConnector::new(config.socket.clone());
        Self::with_connector(config, connector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;

    #[test]
    fn test_connect_outside_runtime_fails_synchronously() {
        let connector = TcpConnector::default();
        let result = connector.connect(&Endpoint::new("127.0.0.1", 9));
        assert!(matches!(result, Err(NetworkError::Connect(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_closed() {
        // Bind and drop to find a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = TcpConnector::default()
            .connect(&Endpoint::new("127.0.0.1", port))
            .unwrap();
        let mut events = transport.take_events().unwrap();

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Error(NetworkError::Connect(_)))
        ));
        assert_eq!(events.recv().await, Some(TransportEvent::Closed));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_connects_and_receives() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let transport = TcpConnector::default()
            .connect(&Endpoint::new("127.0.0.1", port))
            .unwrap();
        let mut events = transport.take_events().unwrap();

        let (mut peer, _) = listener.accept().await.unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));

        peer.write_all(b"hi").await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Data(bytes::Bytes::from_static(b"hi")))
        );

        transport.destroy();
        assert_eq!(events.recv().await, Some(TransportEvent::Closed));
    }

    #[test]
    fn test_client_initial_state() {
        let client = NetClient::new("127.0.0.1", 8080, Some("plc"));

        assert!(!client.is_started());
        assert!(!client.is_connected());
        assert_eq!(client.host(), "127.0.0.1");
        assert_eq!(client.port(), 8080);
        assert_eq!(client.name(), Some("plc"));
        assert!(client.raw_transport().is_none());
        assert!(client.connector().socket_config().keep_alive);
    }
}
