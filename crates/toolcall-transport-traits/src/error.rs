//! Transport error types.

use std::time::Duration;
use thiserror::Error;

use toolcall_protocol::ProtocolError;

use crate::config::LimitsConfig;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// `send` was called before the server announced where to POST.
    #[error("No endpoint: the server has not announced a message endpoint yet")]
    NoEndpoint,

    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The peer refused or failed to accept a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A JSON-RPC envelope violated the message model.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The event stream could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The handshake sequence was violated.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Failed to serialize or deserialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Connection establishment timed out.
    #[error(
        "Connection timed out after {timeout:?} for operation: {operation}. \
         If this is expected, increase the timeout with \
         `TimeoutConfig {{ connect: Duration::from_secs({}) }}`",
        timeout.as_secs() * 2
    )]
    ConnectionTimeout {
        /// The operation that timed out
        operation: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// Single request timed out.
    #[error(
        "Request timed out after {timeout:?} for operation: {operation}. \
         If this is expected, increase the timeout with \
         `TimeoutConfig {{ request: Some(Duration::from_secs({})) }}` \
         or use `TimeoutConfig::patient()` for slow operations",
        timeout.as_secs() * 2
    )]
    RequestTimeout {
        /// The operation that timed out
        operation: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The transport cannot be used in its current state.
    #[error("Transport not available: {0}")]
    NotAvailable(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Request size exceeds the configured maximum limit.
    #[error(
        "Request size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, increase the limit with \
         `LimitsConfig {{ max_request_size: Some({}) }}` or use `LimitsConfig::unlimited()`.",
        size
    )]
    RequestTooLarge {
        /// The actual size of the request in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },

    /// Response size exceeds the configured maximum limit.
    #[error(
        "Response size ({size} bytes) exceeds maximum allowed ({max} bytes). \
         If this is expected, increase the limit with \
         `LimitsConfig {{ max_response_size: Some({}) }}` or use `LimitsConfig::unlimited()`.",
        size
    )]
    ResponseTooLarge {
        /// The actual size of the response in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max: usize,
    },
}

impl TransportError {
    /// Returns `true` for errors the SSE loop recovers from by reconnecting.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::ConfigurationError(_) | Self::NotAvailable(_) | Self::Internal(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedMessage(msg) => Self::MalformedMessage(msg),
            ProtocolError::ProtocolViolation(msg) => Self::ProtocolViolation(msg),
            ProtocolError::Serialization(msg) => Self::SerializationFailed(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Validates that a request message size does not exceed the configured limit.
///
/// # Arguments
///
/// * `size` - The size of the request payload in bytes
/// * `limits` - The limits configuration to check against
///
/// # Returns
///
/// `Ok(())` if the size is within limits or no limit is set, otherwise `Err(TransportError::RequestTooLarge)`
pub fn validate_request_size(size: usize, limits: &LimitsConfig) -> TransportResult<()> {
    if let Some(max_size) = limits.max_request_size
        && size > max_size
    {
        return Err(TransportError::RequestTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}

/// Validates that a response message size does not exceed the configured limit.
///
/// Streams are only checked when [`LimitsConfig::enforce_on_streams`] is set; for the
/// SSE transport `size` is the length of the line still awaiting its terminator.
pub fn validate_response_size(size: usize, limits: &LimitsConfig) -> TransportResult<()> {
    if let Some(max_size) = limits.max_response_size
        && size > max_size
    {
        return Err(TransportError::ResponseTooLarge {
            size,
            max: max_size,
        });
    }
    Ok(())
}
