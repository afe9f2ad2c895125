//! Logging facilities for tether.
//!
//! tether uses the `tracing` crate for instrumentation. To see logs, install a
//! tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("tether_net=trace")
//!         .init();
//!
//!     // Your application code...
//! }
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "tether_core::signal";
    /// Reconnecting client lifecycle target.
    pub const CLIENT: &str = "tether_net::client";
    /// Listening server target.
    pub const SERVER: &str = "tether_net::server";
    /// Transport I/O target.
    pub const TRANSPORT: &str = "tether_net::transport";
}

/// Build the label used to identify a client or server in log lines.
///
/// Named peers render as `"name @ address"`, unnamed ones as the bare address.
pub fn peer_label(name: Option<&str>, address: impl std::fmt::Display) -> String {
    match name {
        Some(name) => format!("{name} @ {address}"),
        None => address.to_string(),
    }
}
