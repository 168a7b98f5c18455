//! # Toolcall Client
//!
//! MCP client on top of any [`Transport`]: runs the initialize handshake,
//! correlates responses with requests by id and exposes the tool surface.
//!
//! ## Features
//!
//! - **Handshake gating**: nothing but `initialize` is sent before the handshake completes
//! - **Response correlation**: concurrent calls share one transport
//! - **Per-request timeouts**: a timed-out call is retired and its late response dropped
//! - **Server requests**: `ping` is answered automatically; install an inbound handler
//!   to take over
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::process::Command;
//! use toolcall_client::{Client, ClientConfig};
//! use toolcall_stdio::StdioTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = StdioTransport::from_command(Command::new("my-mcp-server"));
//! let client = Client::new(Arc::new(transport), ClientConfig::new("my-host", "1.0.0"));
//!
//! client.initialize().await?;
//! let tools = client.list_tools().await?;
//! println!("{} tools", tools.len());
//! client.shutdown().await?;
//! # Ok(())
//! # }
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
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

mod client;
mod config;
mod error;
mod router;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_ENDPOINT_WAIT};
pub use error::{ClientError, ClientResult};

pub use toolcall_protocol::{
    CallToolResult, Capability, CapabilitySet, Implementation, InitializeResult, Tool,
};
pub use toolcall_transport_traits::{MessageHandler, TimeoutConfig, Transport};
