//! # Toolcall STDIO Transport
//!
//! Newline-delimited JSON-RPC over standard I/O, the usual way to reach a local
//! MCP server: the client spawns the server and talks to it through the child's
//! stdin/stdout.
//!
//! - **Newline-delimited JSON**: `LinesCodec` framing, one envelope per line
//! - **Child lifecycle**: spawned on `start`; on `stop` its stdin is closed and it is
//!   killed if it does not exit within the grace period
//! - **stderr for logging**: the child's stderr is inherited
//! - **Tolerant reader**: malformed lines are counted and skipped
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::process::Command;
//! use toolcall_stdio::StdioTransport;
//! use toolcall_transport_traits::Transport;
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = StdioTransport::from_command(Command::new("my-mcp-server"));
//!     transport.set_message_handler(Arc::new(|message| println!("{:?}", message)));
//!     transport.start().await.unwrap();
//!
//!     // Send messages...
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod transport;

pub use transport::{DEFAULT_SHUTDOWN_GRACE, StdioTransport};

// Re-export common types for convenience
pub use toolcall_transport_traits::{
    LimitsConfig, Transport, TransportError, TransportMetrics, TransportResult, TransportState,
    TransportType,
};
