//! Networking module for tether.
//!
//! This crate keeps long-lived connections alive without application code
//! having to babysit them:
//!
//! - **Reconnecting clients**: TCP and TLS clients that reconnect after every
//!   disconnect or failed attempt, with a fixed delay
//! - **Listening server**: Accepts inbound connections and hands each one to
//!   a handler
//! - **Transports**: The seam between the client lifecycle and the socket
//!   that actually moves bytes
//!
//! # Reconnecting Client
//!
//! ```ignore
//! use tether_net::NetClient;
//!
//! let client = NetClient::new("10.0.0.7", 502, Some("plc"));
//!
//! client.connected.connect(|_| println!("Connected"));
//! client.disconnected.connect(|()| println!("Disconnected, retrying"));
//! client.data.connect(|data| println!("Received {} bytes", data.len()));
//!
//! client.start();
//!
//! // Point the client somewhere else; the current connection is dropped
//! // and the client reconnects to the new port.
//! client.set_port(503);
//!
//! client.stop().await;
//! ```
//!
//! # TLS
//!
//! ```ignore
//! use tether_net::TlsNetClient;
//!
//! // Certificate verification is on unless explicitly disabled.
//! let client = TlsNetClient::new("broker.example.com", 8883, true, Some("broker"))?;
//! client.start();
//! ```
//!
//! # Listening Server
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_net::{NetServer, TcpConnection};
//!
//! let server = NetServer::new(8080, Some("ingest"), |conn: Arc<TcpConnection>| {
//!     println!("New client from {}", conn.peer_addr());
//! });
//!
//! server.start()?;
//! ```

pub mod client;
pub mod config;
mod endpoint;
mod error;
pub mod server;
mod stop;
pub mod tls;
pub mod transport;

pub use endpoint::Endpoint;
pub use error::{NetworkError, Result};
pub use stop::StopFuture;

// Re-export commonly used types at the crate root
pub use client::{
    ClientState, NetClient, ReconnectingClient, TcpConnector, TlsConnector, TlsNetClient,
};
pub use config::{DEFAULT_RECONNECT_DELAY, NetClientConfig, NetServerConfig, TcpSocketConfig};
pub use server::{ClientHandler, NetServer, TcpConnection};
pub use tls::{AlpnProtocol, Certificate, Identity, TlsConfig, TlsVersion};
pub use transport::{Connector, Transport, TransportEvent, TransportId};
