//! Self-healing TCP and TLS clients.
//!
//! - **ReconnectingClient**: The lifecycle core, generic over a [`Connector`](crate::transport::Connector)
//! - **NetClient**: Plain TCP variant with keep-alive
//! - **TlsNetClient**: TLS variant with optional certificate verification
//!
//! # Example
//!
//! ```ignore
//! use tether_net::client::NetClient;
//!
//! let client = NetClient::new("127.0.0.1", 8080, Some("telemetry"));
//!
//! client.connected.connect(|transport| {
//!     println!("Connected via {}", transport.id());
//! });
//! client.disconnected.connect(|()| println!("Disconnected"));
//! client.data.connect(|data| println!("Received {} bytes", data.len()));
//!
//! client.start();
//!
//! // Fails with NetworkError::NotConnected until the connection is up
//! let _ = client.write(&b"Hello, Server!"[..]);
//!
//! client.stop().await;
//! ```

mod reconnecting;
mod state;
mod tcp;
mod tls;

pub use reconnecting::ReconnectingClient;
pub use state::ClientState;
pub use tcp::{NetClient, TcpConnector};
pub use tls::{TlsConnector, TlsNetClient};
