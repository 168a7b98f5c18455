//! # Toolcall Transport Traits
//!
//! Core transport traits and types shared by every toolcall transport and by the
//! client that drives them.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`Transport`] (lifecycle, send, message callback) and
//!   [`HttpConnector`], the narrow HTTP capability the SSE transport is built on
//! - **Types**: [`TransportType`], [`TransportState`], [`MessageHandler`], [`PostResponse`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`LimitsConfig`], [`TimeoutConfig`], [`TlsConfig`]
//! - **Metrics**: [`TransportMetrics`], [`AtomicMetrics`]
//!
//! ## Usage
//!
//! Transport implementations depend on this crate and implement [`Transport`]:
//!
//! ```rust,ignore
//! use toolcall_transport_traits::{Transport, TransportResult, TransportType};
//!
//! #[derive(Debug)]
//! struct MyTransport { /* ... */ }
//!
//! impl Transport for MyTransport {
//!     fn transport_type(&self) -> TransportType { /* ... */ }
//!     // ... other trait methods
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
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod config;
mod error;
mod metrics;
mod traits;
mod types;

// Re-export all public items
pub use config::{LimitsConfig, TimeoutConfig, TlsConfig, TlsVersion};
pub use error::{TransportError, TransportResult};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use traits::{ByteStream, HttpConnector, Transport};
pub use types::{MessageHandler, PostResponse, TransportState, TransportType};

// Re-export validation functions
pub use error::{validate_request_size, validate_response_size};
