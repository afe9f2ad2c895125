//! Core systems for tether.
//!
//! This crate provides the foundational pieces shared by the networking crate:
//!
//! - **Signal/Slot System**: Type-safe publish/subscribe used for connection events
//! - **Logging targets**: Stable `tracing` target names for log filtering
//!
//! # Signal/Slot Example
//!
//! ```
//! use tether_core::Signal;
//!
//! // Create a signal that notifies when bytes arrive
//! let data = Signal::<Vec<u8>>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = data.connect(|bytes| {
//!     println!("Received {} bytes", bytes.len());
//! });
//!
//! // Emit the signal
//! data.emit(b"hello".to_vec());
//!
//! // Disconnect when done
//! data.disconnect(conn_id);
//! ```

pub mod logging;
pub mod signal;

pub use signal::{ConnectionId, Signal};
