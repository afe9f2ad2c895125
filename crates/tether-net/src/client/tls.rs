//! TLS client variant.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector as RustlsConnector;

use super::reconnecting::ReconnectingClient;
use super::tcp::connect_tcp;
use crate::config::{NetClientConfig, TcpSocketConfig};
use crate::endpoint::Endpoint;
use crate::error::{NetworkError, Result};
use crate::tls::TlsConfig;
use crate::transport::{self, Connector, Transport, TransportIo};

/// Produces TLS transports.
///
/// The rustls configuration is built once, when the connector is created.
/// Peer certificate verification is on unless the [`TlsConfig`] asks for
/// `danger_accept_invalid_certs`.
#[derive(Clone)]
pub struct TlsConnector {
    socket: TcpSocketConfig,
    tls: TlsConfig,
    connector: RustlsConnector,
}

impl TlsConnector {
    /// Create a connector from socket and TLS settings.
    pub fn new(socket: TcpSocketConfig, tls: TlsConfig) -> Result<Self> {
        let rustls_config = tls.build_rustls_config()?;
        Ok(Self {
            socket,
            tls,
            connector: RustlsConnector::from(rustls_config),
        })
    }

    /// Check whether peer certificates are verified.
    pub fn verifies_certificates(&self) -> bool {
        !self.tls.danger_accept_invalid_certs
    }

    /// Get the TLS settings.
    pub fn tls_config(&self) -> &TlsConfig {
        &self.tls
    }
}

impl Connector for TlsConnector {
    fn connect(&self, endpoint: &Endpoint) -> Result<Transport> {
        let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
            NetworkError::Tls(format!("Invalid server name '{}': {}", endpoint.host, e))
        })?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NetworkError::Connect(e.to_string()))?;

        let (transport, io) = transport::pair(endpoint.clone());
        runtime.spawn(run(
            endpoint.address(),
            server_name,
            self.connector.clone(),
            self.socket.clone(),
            io,
        ));
        Ok(transport)
    }
}

async fn run(
    address: String,
    server_name: ServerName<'static>,
    connector: RustlsConnector,
    socket: TcpSocketConfig,
    mut io: TransportIo,
) {
    let Some(tcp_stream) = connect_tcp(&address, &socket, &mut io).await else {
        return;
    };

    let tls_stream = tokio::select! {
        result = connector.connect(server_name, tcp_stream) => match result {
            Ok(stream) => stream,
            Err(e) => {
                io.error(NetworkError::Tls(format!("TLS handshake failed: {e}")));
                return;
            }
        },
        _ = io.destroyed() => return,
    };

    io.connected();
    transport::drive_stream(tls_stream, &mut io, socket.read_buffer_size).await;
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("socket", &self.socket)
            .field("tls", &self.tls)
            .finish()
    }
}

/// A reconnecting TLS client.
pub type TlsNetClient = ReconnectingClient<TlsConnector>;

impl ReconnectingClient<TlsConnector> {
    /// Create a TLS client for `host:port`.
    ///
    /// With `verify_certificates` set to `false` any server certificate is
    /// accepted. `name` is only used to label log output.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        verify_certificates: bool,
        name: Option<&str>,
    ) -> Result<Self> {
        let mut config = NetClientConfig::new(host, port);
        config.name = name.map(str::to_string);

        let mut tls = TlsConfig::new();
        if !verify_certificates {
            tls = tls.danger_accept_invalid_certs();
        }
        Self::with_config(config, tls)
    }

    /// Create a TLS client from full client and TLS configurations.
    pub fn with_config(config: NetClientConfig, tls: TlsConfig) -> Result<Self> {
        let connector = TlsConnector::new(config.socket.clone(), tls)?;
        Ok(Self::with_connector(config, connector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_defaults_on() {
        let client = TlsNetClient::new("example.com", 443, true, None).unwrap();
        assert!(client.connector().verifies_certificates());
    }

    #[test]
    fn test_verification_can_be_disabled() {
        let client = TlsNetClient::new("example.com", 443, false, Some("lab")).unwrap();
        assert!(!client.connector().verifies_certificates());
        assert_eq!(client.name(), Some("lab"));
    }

    #[test]
    fn test_invalid_server_name_fails_synchronously() {
        let connector = TlsConnector::new(TcpSocketConfig::default(), TlsConfig::new()).unwrap();
        let result = connector.connect(&Endpoint::new("not a hostname", 443));
        assert!(matches!(result, Err(NetworkError::Tls(_))));
    }

    #[test]
    fn test_custom_roots_without_certificates_fail() {
        let result = TlsNetClient::with_config(
            NetClientConfig::new("example.com", 443),
            TlsConfig::new().use_only_custom_roots(),
        );
        assert!(matches!(result, Err(NetworkError::Tls(_))));
    }
}
