use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid topic filter: {0}")]
    InvalidTopicFilter(String),

    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),

    #[error("Unsupported protocol name: {0}")]
    UnsupportedProtocol(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("QoS {0} not supported")]
    QoSNotSupported(u8),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Timeout")]
    Timeout,

    #[error("Client closed connection")]
    ClientClosed,

    #[error("Connection closed by peer")]
    ConnectionClosedByPeer,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MqttError {
    /// True for errors that mean the peer simply went away, as opposed to a
    /// protocol violation or local fault.
    #[must_use]
    pub fn is_normal_disconnect(&self) -> bool {
        match self {
            Self::ClientClosed | Self::ConnectionClosedByPeer => true,
            Self::Io(msg) => {
                msg.contains("Connection reset") || msg.contains("Broken pipe")
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}
