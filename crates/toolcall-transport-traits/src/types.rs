//! Core transport types.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use toolcall_protocol::Message;

/// Enumerates the transports a client can be connected through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// A child process speaking newline-delimited JSON-RPC on stdio.
    Stdio,
    /// HTTP, with an SSE stream for server-to-client traffic and POST for the rest.
    Http,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Lifecycle of a transport session.
///
/// `Idle -> Connecting -> Streaming`, with `Streaming -> Connecting` on a recoverable
/// connection error. `Stopped` is terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    /// Created, background loop not started.
    #[default]
    Idle,
    /// Background loop running, connection being (re)established.
    Connecting,
    /// Connection open and delivering messages.
    Streaming,
    /// Stopped; the session cannot be restarted.
    Stopped,
}

impl TransportState {
    /// Returns `true` while the background loop is alive.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Callback receiving every decoded inbound message.
///
/// Invoked from the transport's background task; implementations must not block and
/// should hand heavy work off to their own queue.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Status and body of a completed POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body (usually empty for `202 Accepted`)
    pub body: Bytes,
}

impl PostResponse {
    /// Any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
