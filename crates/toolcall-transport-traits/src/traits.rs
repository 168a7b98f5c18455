//! Core transport traits.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use toolcall_protocol::Message;

use crate::error::TransportResult;
use crate::metrics::TransportMetrics;
use crate::types::{MessageHandler, PostResponse, TransportState, TransportType};

/// Raw body chunks of a streaming GET, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = TransportResult<Bytes>> + Send>>;

/// The core trait for all transport implementations.
///
/// A transport owns a background I/O task that decodes inbound envelopes and hands
/// them to the registered [`MessageHandler`]. Outbound messages go through
/// [`Transport::send`], which may be called from any task.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current state of the transport.
    fn state(&self) -> TransportState;

    /// Spawns the background loop. A no-op if it is already running.
    fn start(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Signals the background loop to terminate and waits for it to finish.
    ///
    /// Safe to call repeatedly, or without a prior `start`. Once this returns the
    /// background task no longer touches shared state.
    fn stop(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Sends a single message to the peer.
    fn send(
        &self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Registers the callback for inbound messages, replacing any previous one.
    fn set_message_handler(&self, handler: MessageHandler);

    /// Returns a snapshot of the transport's current metrics.
    fn metrics(&self) -> TransportMetrics;

    /// Waits until `send` can succeed, or `timeout` elapses.
    ///
    /// Transports that can always send resolve immediately.
    fn wait_ready(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        let _ = timeout;
        Box::pin(async { Ok(()) })
    }

    /// Returns the endpoint address or identifier for this transport, if known.
    fn endpoint(&self) -> Option<String> {
        None
    }
}

/// The HTTP capability the SSE transport is built on.
///
/// Both operations are cancelled by dropping the returned future (or, for an open
/// stream, the stream itself).
pub trait HttpConnector: Send + Sync + std::fmt::Debug {
    /// Opens a streaming GET on `uri`, sending `Last-Event-ID` when `last_event_id` is set.
    fn open_stream<'a>(
        &'a self,
        uri: &'a str,
        last_event_id: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = TransportResult<ByteStream>> + Send + 'a>>;

    /// POSTs a JSON body to `uri`.
    fn post<'a>(
        &'a self,
        uri: &'a str,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = TransportResult<PostResponse>> + Send + 'a>>;
}
