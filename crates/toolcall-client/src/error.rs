//! Client error type.

use thiserror::Error;
use toolcall_protocol::{JsonRpcError, ProtocolError};
use toolcall_transport_traits::TransportError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The transport failed to deliver the call or its answer (includes request timeouts).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The handshake sequence was violated or a message could not be encoded/decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered with a JSON-RPC error object.
    #[error("Server error: {0}")]
    Rpc(JsonRpcError),

    /// The server answered with a result of the wrong shape.
    #[error("Invalid result for `{method}`: {reason}")]
    InvalidResult {
        /// Method whose result failed to decode
        method: String,
        /// Decoder message
        reason: String,
    },

    /// The client was shut down while the call was outstanding, or before it was made.
    #[error("Client is shut down")]
    Shutdown,
}

impl ClientError {
    /// JSON-RPC error code when the server rejected the call.
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            Self::Rpc(error) => Some(error.code),
            _ => None,
        }
    }

    /// Returns `true` when the call timed out waiting for its response.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::RequestTimeout { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_classification() {
        let rpc = ClientError::Rpc(JsonRpcError::method_not_found("nope"));
        assert_eq!(rpc.rpc_code(), Some(-32601));
        assert!(!rpc.is_timeout());

        let timeout = ClientError::from(TransportError::RequestTimeout {
            operation: "tools/call()".to_string(),
            timeout: Duration::from_secs(1),
        });
        assert!(timeout.is_timeout());
        assert_eq!(timeout.rpc_code(), None);
    }
}
