//! Configuration types for clients and the listening server.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;

/// Delay between a disconnect (or failed attempt) and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Socket-level options for TCP connections.
#[derive(Clone, Debug)]
pub struct TcpSocketConfig {
    /// Enable TCP_NODELAY (disable Nagle's algorithm).
    pub no_delay: bool,
    /// Enable TCP keep-alive probes.
    pub keep_alive: bool,
    /// Idle time before the first keep-alive probe.
    ///
    /// `Duration::ZERO` enables keep-alive and leaves the idle time at the
    /// operating system default.
    pub keep_alive_initial_delay: Duration,
    /// Read buffer size in bytes.
    pub read_buffer_size: usize,
}

impl Default for TcpSocketConfig {
    fn default() -> Self {
        Self {
            no_delay: false,
            keep_alive: true,
            keep_alive_initial_delay: Duration::ZERO,
            read_buffer_size: 8192,
        }
    }
}

impl TcpSocketConfig {
    /// Create a new socket configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable TCP_NODELAY.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    /// Enable keep-alive with the given initial delay.
    pub fn keep_alive(mut self, initial_delay: Duration) -> Self {
        self.keep_alive = true;
        self.keep_alive_initial_delay = initial_delay;
        self
    }

    /// Disable keep-alive.
    pub fn no_keep_alive(mut self) -> Self {
        self.keep_alive = false;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Apply these options to a connected stream.
    pub(crate) fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.no_delay)?;

        if self.keep_alive {
            let socket = socket2::SockRef::from(stream);
            let mut keepalive = socket2::TcpKeepalive::new();
            if !self.keep_alive_initial_delay.is_zero() {
                keepalive = keepalive.with_time(self.keep_alive_initial_delay);
            }
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Configuration for a reconnecting client.
#[derive(Clone, Debug)]
pub struct NetClientConfig {
    /// Hostname or IP address of the server.
    pub host: String,
    /// Port of the server.
    pub port: u16,
    /// Optional name used in log output.
    pub name: Option<String>,
    /// Delay before each connect attempt.
    pub reconnect_delay: Duration,
    /// Socket-level options.
    pub socket: TcpSocketConfig,
}

impl NetClientConfig {
    /// Create a new client configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            name: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            socket: TcpSocketConfig::default(),
        }
    }

    /// Set the name used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the delay before each connect attempt.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set socket options.
    pub fn socket_config(mut self, config: TcpSocketConfig) -> Self {
        self.socket = config;
        self
    }

    /// Enable TCP_NODELAY.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.socket.no_delay = enabled;
        self
    }

    /// Get the address string (host:port).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration for a listening server.
#[derive(Clone, Debug)]
pub struct NetServerConfig {
    /// The address to bind to.
    pub bind_address: String,
    /// The port to listen on. `0` picks an ephemeral port.
    pub port: u16,
    /// Name used in log output.
    pub name: String,
    /// Socket-level options for accepted connections.
    pub socket: TcpSocketConfig,
    /// Connection backlog size.
    pub backlog: u32,
}

impl NetServerConfig {
    /// Create a server configuration listening on all interfaces.
    pub fn new(port: u16) -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port,
            name: "NetServer".to_string(),
            socket: TcpSocketConfig::default().no_keep_alive(),
            backlog: 128,
        }
    }

    /// Set the address to bind to.
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the name used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set socket options for accepted connections.
    pub fn socket_config(mut self, config: TcpSocketConfig) -> Self {
        self.socket = config;
        self
    }

    /// Enable TCP_NODELAY for accepted connections.
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.socket.no_delay = enabled;
        self
    }

    /// Set the connection backlog size.
    pub fn backlog(mut self, size: u32) -> Self {
        self.backlog = size;
        self
    }

    /// Get the bind address string (address:port).
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_config_defaults() {
        let config = TcpSocketConfig::new();
        assert!(!config.no_delay);
        assert!(config.keep_alive);
        assert_eq!(config.keep_alive_initial_delay, Duration::ZERO);
        assert_eq!(config.read_buffer_size, 8192);
    }

    #[test]
    fn test_socket_config_builder() {
        let config = TcpSocketConfig::new()
            .no_delay(true)
            .keep_alive(Duration::from_secs(60))
            .read_buffer_size(16384);

        assert!(config.no_delay);
        assert!(config.keep_alive);
        assert_eq!(config.keep_alive_initial_delay, Duration::from_secs(60));
        assert_eq!(config.read_buffer_size, 16384);

        assert!(!config.no_keep_alive().keep_alive);
    }

    #[test]
    fn test_client_config_builder() {
        let config = NetClientConfig::new("localhost", 8080)
            .name("telemetry")
            .reconnect_delay(Duration::from_millis(250))
            .no_delay(true);

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 8080);
        assert_eq!(config.address(), "localhost:8080");
        assert_eq!(config.name.as_deref(), Some("telemetry"));
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert!(config.socket.no_delay);
    }

    #[test]
    fn test_client_config_default_delay() {
        let config = NetClientConfig::new("localhost", 8080);
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(DEFAULT_RECONNECT_DELAY, Duration::from_millis(1000));
        assert!(config.name.is_none());
    }

    #[test]
    fn test_server_config_builder() {
        let config = NetServerConfig::new(9000)
            .bind_address("127.0.0.1")
            .name("ingest")
            .no_delay(true)
            .backlog(256);

        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.name, "ingest");
        assert!(config.socket.no_delay);
        assert_eq!(config.backlog, 256);
    }

    #[tokio::test]
    async fn test_apply_socket_options() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        TcpSocketConfig::new()
            .no_delay(true)
            .keep_alive(Duration::from_secs(30))
            .apply(&stream)
            .unwrap();
        assert!(stream.nodelay().unwrap());

        TcpSocketConfig::new().apply(&stream).unwrap();
        assert!(!stream.nodelay().unwrap());
    }
}
