//! Error types for the networking crate.

/// Network-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The transport provider could not establish a connection.
    #[error("Connection error: {0}")]
    Connect(String),

    /// A connected transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Data was written while no connection was established.
    #[error("Failed to send data: Not connected")]
    NotConnected,

    /// TLS/SSL configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_connected_message() {
        assert_eq!(
            NetworkError::NotConnected.to_string(),
            "Failed to send data: Not connected"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err: NetworkError = io.into();
        assert!(matches!(err, NetworkError::Io(ref msg) if msg.contains("address in use")));
    }
}
