//! Listening server.
//!
//! - **NetServer**: Binds a port and forwards every accepted client to a [`ClientHandler`]
//! - **TcpConnection**: One accepted client, with its own signals
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_net::server::{NetServer, TcpConnection};
//!
//! let server = NetServer::new(8080, Some("echo"), |conn: Arc<TcpConnection>| {
//!     // A strong reference here would keep the connection alive forever.
//!     let echo = Arc::downgrade(&conn);
//!     conn.data_received.connect(move |data| {
//!         if let Some(conn) = echo.upgrade() {
//!             let _ = conn.send(data.clone());
//!         }
//!     });
//! });
//!
//! server.start()?;
//! ```

mod connection;
mod listener;

pub use connection::TcpConnection;
pub use listener::{ClientHandler, NetServer};
