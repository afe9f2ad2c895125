//! Lifecycle state of a reconnecting client.

/// Current lifecycle state of a reconnecting client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Not started, or fully stopped.
    #[default]
    Idle,
    /// Started and waiting for a connection, either for the reconnect delay
    /// or for the current attempt to complete.
    Connecting,
    /// Connected and ready to send/receive data.
    Connected,
    /// `stop()` was called and the client waits for the transport to close.
    Stopping,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}
