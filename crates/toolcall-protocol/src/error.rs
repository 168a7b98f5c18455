//! Protocol-level error types.

use thiserror::Error;

/// A specialized `Result` type for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or sequencing protocol messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The envelope shape violates JSON-RPC invariants (missing `id`, both
    /// `result` and `error`, `method` on a response, invalid JSON, ...).
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The handshake sequence was violated, e.g. a call issued before `initialized`.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A typed payload could not be converted to or from JSON.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl ProtocolError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage(message.into())
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation(message.into())
    }

    /// Returns `true` for [`ProtocolError::MalformedMessage`].
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedMessage(_))
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
