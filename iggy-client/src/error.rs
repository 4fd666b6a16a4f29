//! Error types for the Iggy client library

/// Main error type for Iggy client operations
#[derive(Debug, thiserror::Error)]
pub enum IggyClientError {
    /// Socket connect or address resolution failure
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Malformed client configuration, e.g. a bad base address
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// The broker answered with a non-success status
    #[error("Transport error (status {status}): {reason}")]
    Transport {
        status: u32,
        code: Option<String>,
        reason: String,
    },

    /// Malformed wire payload
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// JSON serialization/deserialization errors on the HTTP path
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Timeout errors
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Bounded send channel is at capacity
    #[error("Send channel is full (capacity {capacity})")]
    ChannelFull { capacity: usize },

    /// Dispatcher side of the send channel is gone
    #[error("Send channel is closed")]
    ChannelClosed,

    /// A message, header, identifier or partitioning value is out of range
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    /// Dispatcher lifecycle misuse
    #[error("Dispatcher error: {message}")]
    Dispatcher { message: String },
}

impl IggyClientError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transport error from a broker status code
    pub fn transport<S: Into<String>>(status: u32, reason: S) -> Self {
        Self::Transport {
            status,
            code: None,
            reason: reason.into(),
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid message error
    pub fn invalid_message<S: Into<String>>(message: S) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Create a dispatcher error
    pub fn dispatcher<S: Into<String>>(message: S) -> Self {
        Self::Dispatcher {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::ChannelFull { .. } => true,
            Self::Io(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if this error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Io(_))
    }

    /// Check if this error came back from the broker
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Broker status code, if this is a transport error
    pub fn status(&self) -> Option<u32> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for IggyClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
