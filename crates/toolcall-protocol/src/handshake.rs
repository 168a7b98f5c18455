//! Client-side tracking of the `initialize` / `initialized` exchange.
//!
//! No method other than `initialize` may be issued before the three-step sequence
//! completes:
//!
//! 1. client sends `initialize` ([`Handshake::begin`])
//! 2. server answers with an [`InitializeResult`] ([`Handshake::accept`])
//! 3. client sends the `initialized` notification ([`Handshake::complete`])

use tracing::{debug, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::jsonrpc::{RequestId, Response, ResponsePayload};
use crate::methods;
use crate::types::InitializeResult;

/// Where the handshake currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Nothing sent yet
    #[default]
    NotStarted,
    /// `initialize` sent, waiting for the response with this id
    Initializing {
        /// Id of the outstanding `initialize` request
        request_id: RequestId,
    },
    /// Server answered; the `initialized` notification is still due
    Negotiated,
    /// Handshake complete, any method may be called
    Initialized,
}

/// Handshake state machine plus the negotiated server information.
#[derive(Debug, Clone)]
pub struct Handshake {
    requested_version: String,
    state: HandshakeState,
    server: Option<InitializeResult>,
}

impl Handshake {
    /// New handshake that will request `protocol_version`.
    pub fn new(protocol_version: impl Into<String>) -> Self {
        Self {
            requested_version: protocol_version.into(),
            state: HandshakeState::NotStarted,
            server: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Returns `true` once the `initialized` notification has been sent.
    pub fn is_initialized(&self) -> bool {
        self.state == HandshakeState::Initialized
    }

    /// Negotiated server information, available after [`Handshake::accept`].
    pub fn server(&self) -> Option<&InitializeResult> {
        self.server.as_ref()
    }

    /// Record that the `initialize` request with `request_id` was sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] if the handshake has already begun.
    pub fn begin(&mut self, request_id: RequestId) -> ProtocolResult<()> {
        if self.state != HandshakeState::NotStarted {
            return Err(ProtocolError::violation(format!(
                "initialize already sent (state: {:?})",
                self.state
            )));
        }
        debug!(id = %request_id, "initialize request sent");
        self.state = HandshakeState::Initializing { request_id };
        Ok(())
    }

    /// Consume the server's answer to `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] if no `initialize` is outstanding,
    /// the id does not match, or the server answered with an error. Returns
    /// [`ProtocolError::Serialization`] if the result is not an `InitializeResult`.
    pub fn accept(&mut self, response: Response) -> ProtocolResult<&InitializeResult> {
        let HandshakeState::Initializing { request_id } = &self.state else {
            return Err(ProtocolError::violation(format!(
                "unexpected initialize response (state: {:?})",
                self.state
            )));
        };
        if *request_id != response.id {
            return Err(ProtocolError::violation(format!(
                "initialize response id {} does not match request id {}",
                response.id, request_id
            )));
        }

        let result = match response.payload {
            ResponsePayload::Result(value) => value,
            ResponsePayload::Error(error) => {
                self.state = HandshakeState::NotStarted;
                return Err(ProtocolError::violation(format!(
                    "server rejected initialize: {}",
                    error
                )));
            }
        };
        let result: InitializeResult = serde_json::from_value(result)?;

        if result.protocol_version != self.requested_version {
            warn!(
                requested = %self.requested_version,
                negotiated = %result.protocol_version,
                "server negotiated a different protocol version"
            );
        }
        debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "initialize accepted"
        );

        self.state = HandshakeState::Negotiated;
        Ok(self.server.insert(result))
    }

    /// Record that the `initialized` notification was sent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] unless the server response was accepted.
    pub fn complete(&mut self) -> ProtocolResult<()> {
        if self.state != HandshakeState::Negotiated {
            return Err(ProtocolError::violation(format!(
                "cannot complete handshake (state: {:?})",
                self.state
            )));
        }
        self.state = HandshakeState::Initialized;
        Ok(())
    }

    /// Check whether `method` may be sent in the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ProtocolViolation`] for any call issued before the
    /// handshake completed.
    pub fn check(&self, method: &str) -> ProtocolResult<()> {
        match (&self.state, method) {
            (HandshakeState::Initialized, _) => Ok(()),
            (HandshakeState::NotStarted, methods::INITIALIZE) => Ok(()),
            (HandshakeState::Negotiated, methods::INITIALIZED) => Ok(()),
            (state, method) => Err(ProtocolError::violation(format!(
                "`{}` called before initialization completed (state: {:?})",
                method, state
            ))),
        }
    }

    /// Forget everything and start over.
    pub fn reset(&mut self) {
        self.state = HandshakeState::NotStarted;
        self.server = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcError;
    use serde_json::json;

    fn server_result(version: &str) -> serde_json::Value {
        json!({
            "protocolVersion": version,
            "capabilities": {"tools": {"listChanged": true}},
            "serverInfo": {"name": "srv", "version": "0.9"}
        })
    }

    #[test]
    fn test_full_sequence() {
        let mut handshake = Handshake::new("2024-11-05");
        assert!(handshake.check(methods::INITIALIZE).is_ok());
        assert!(handshake.check(methods::TOOLS_LIST).is_err());

        handshake.begin(RequestId::from(1)).unwrap();
        assert!(handshake.check(methods::TOOLS_CALL).is_err());

        let server = handshake
            .accept(Response::success(1, server_result("2024-11-05")))
            .unwrap();
        assert_eq!(server.server_info.name, "srv");
        assert_eq!(handshake.state(), &HandshakeState::Negotiated);
        assert!(handshake.check(methods::INITIALIZED).is_ok());
        assert!(handshake.check(methods::TOOLS_LIST).is_err());

        handshake.complete().unwrap();
        assert!(handshake.is_initialized());
        assert!(handshake.check(methods::TOOLS_CALL).is_ok());
    }

    #[test]
    fn test_begin_twice_is_a_violation() {
        let mut handshake = Handshake::new("2024-11-05");
        handshake.begin(RequestId::from("a")).unwrap();
        let err = handshake.begin(RequestId::from("b")).unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    }

    #[test]
    fn test_mismatched_id_is_rejected() {
        let mut handshake = Handshake::new("2024-11-05");
        handshake.begin(RequestId::from(1)).unwrap();
        let err = handshake
            .accept(Response::success(2, server_result("2024-11-05")))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
        // still waiting for the right one
        assert!(matches!(
            handshake.state(),
            HandshakeState::Initializing { .. }
        ));
    }

    #[test]
    fn test_error_response_resets_to_not_started() {
        let mut handshake = Handshake::new("2024-11-05");
        handshake.begin(RequestId::from(1)).unwrap();
        let err = handshake
            .accept(Response::error_response(
                1,
                JsonRpcError::invalid_params("unsupported version"),
            ))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
        assert_eq!(handshake.state(), &HandshakeState::NotStarted);
    }

    #[test]
    fn test_garbage_result_is_a_serialization_error() {
        let mut handshake = Handshake::new("2024-11-05");
        handshake.begin(RequestId::from(1)).unwrap();
        let err = handshake
            .accept(Response::success(1, json!({"unexpected": true})))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Serialization(_)));
    }

    #[test]
    fn test_version_mismatch_is_tolerated() {
        let mut handshake = Handshake::new("2024-11-05");
        handshake.begin(RequestId::from(1)).unwrap();
        let server = handshake
            .accept(Response::success(1, server_result("2025-03-26")))
            .unwrap();
        assert_eq!(server.protocol_version, "2025-03-26");
    }

    #[test]
    fn test_complete_requires_accepted_response() {
        let mut handshake = Handshake::new("2024-11-05");
        assert!(handshake.complete().is_err());
        handshake.begin(RequestId::from(1)).unwrap();
        assert!(handshake.complete().is_err());
    }

    #[test]
    fn test_reset() {
        let mut handshake = Handshake::new("2024-11-05");
        handshake.begin(RequestId::from(1)).unwrap();
        handshake
            .accept(Response::success(1, server_result("2024-11-05")))
            .unwrap();
        handshake.complete().unwrap();

        handshake.reset();
        assert_eq!(handshake.state(), &HandshakeState::NotStarted);
        assert!(handshake.server().is_none());
    }
}
