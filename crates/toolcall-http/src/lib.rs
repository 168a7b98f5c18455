//! # Toolcall HTTP Transport
//!
//! HTTP/SSE client transport: server-to-client traffic arrives as Server-Sent
//! Events on a long-lived GET, client-to-server traffic is POSTed to the endpoint
//! the server announces on that stream.
//!
//! ## Features
//!
//! - **Incremental SSE parsing**: [`SseParser`] accepts arbitrary chunk boundaries and
//!   `\n`, `\r` or `\r\n` line endings
//! - **Endpoint discovery**: `endpoint` events replace the POST target; relative URIs
//!   are resolved against the stream URL
//! - **Auto-reconnect**: configurable [`RetryPolicy`] with exponential backoff
//! - **Last-Event-ID resumability**: reconnects resume from the last received event id
//! - **Pluggable HTTP**: the session only needs an [`HttpConnector`]; [`ReqwestConnector`]
//!   is the default
//! - **Size limits**: POST bodies and unterminated stream lines are bounded
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use toolcall_http::{SseClientConfig, SseTransport};
//! use toolcall_transport_traits::Transport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SseTransport::new(SseClientConfig::new("http://localhost:8080/sse"))?;
//!     transport.set_message_handler(Arc::new(|message| println!("<- {}", message.kind())));
//!
//!     transport.start().await?;
//!     let endpoint = transport.wait_for_endpoint(Duration::from_secs(10)).await?;
//!     println!("posting to {endpoint}");
//!
//!     transport.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Flow
//!
//! 1. Client opens the event stream (GET with `Accept: text/event-stream`)
//! 2. Server sends an `endpoint` event with the message endpoint URI
//! 3. Client sends requests via POST to that endpoint
//! 4. Server answers with `message` events on the stream (or inline in the POST response)
//! 5. On disconnect the client reconnects, sending `Last-Event-ID`
//!
//! ## Security
//!
//! - TLS 1.3 is required by default
//! - Disabling certificate validation requires the [`INSECURE_TLS_ENV_VAR`] opt-in

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod connector;
mod dispatcher;
mod retry;
mod sse;
mod transport;

pub use config::SseClientConfig;
pub use connector::{INSECURE_TLS_ENV_VAR, ReqwestConnector};
pub use dispatcher::{ENDPOINT_EVENT, resolve_endpoint};
pub use retry::RetryPolicy;
pub use sse::{DEFAULT_EVENT_TYPE, SseEvent, SseParser};
pub use transport::SseTransport;

// Re-export common types from traits crate for convenience
pub use toolcall_transport_traits::{
    HttpConnector, LimitsConfig, TimeoutConfig, TlsConfig, TlsVersion, Transport,
    TransportError, TransportMetrics, TransportResult, TransportState, TransportType,
};
