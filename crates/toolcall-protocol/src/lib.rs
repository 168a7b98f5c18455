//! # Toolcall Protocol
//!
//! JSON-RPC 2.0 message model for the Model Context Protocol (MCP), as seen from a
//! tool-calling client.
//!
//! This crate is transport-agnostic. It provides:
//!
//! - **Envelopes**: [`Request`], [`Response`], [`Notification`] and the [`Message`] sum type,
//!   with canonical encode (`to_json`) and shape-sniffing decode ([`Message::decode`])
//! - **Handshake payloads**: [`InitializeParams`], [`InitializeResult`], [`CapabilitySet`]
//! - **Handshake tracking**: [`Handshake`], which rejects calls made before the
//!   `initialize` / `initialized` exchange has completed
//! - **Tool payloads**: [`Tool`], [`ListToolsResult`], [`CallToolParams`], [`CallToolResult`]
//!
//! ## Wire shape
//!
//! JSON-RPC carries no explicit discriminator, so decoding inspects which keys are present:
//!
//! | Keys present | Decoded as |
//! |---|---|
//! | `method` + `id` | [`Request`] |
//! | `method`, no `id` | [`Notification`] |
//! | `result` xor `error` (+ `id`) | [`Response`] |
//!
//! ```rust
//! use toolcall_protocol::{Message, MessageKind};
//!
//! let message: Message = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.parse().unwrap();
//! assert_eq!(message.kind(), MessageKind::Response);
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

mod error;
mod handshake;
pub mod jsonrpc;
pub mod methods;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use handshake::{Handshake, HandshakeState};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcErrorCode, Message, MessageKind,
    Notification, Request, RequestId, Response, ResponsePayload,
};
pub use types::{
    CallToolParams, CallToolResult, Capability, CapabilitySet, Implementation, InitializeParams,
    InitializeResult, ListToolsParams, ListToolsResult, Tool,
};

/// Protocol version sent in `initialize` unless the caller overrides it.
///
/// This is the revision that defines the HTTP+SSE transport with `endpoint` events.
pub const LATEST_PROTOCOL_VERSION: &str = "2024-11-05";

/// Maximum message size in bytes (1MB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
