//! Routing of decoded SSE events.
//!
//! `endpoint` events replace the POST target, `message` events carry JSON-RPC
//! envelopes for the registered handler, everything else is ignored.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use toolcall_protocol::{Message, MessageKind};
use toolcall_transport_traits::{AtomicMetrics, MessageHandler, TransportError, TransportResult};
use tracing::{debug, trace, warn};
use url::Url;

use crate::sse::{DEFAULT_EVENT_TYPE, SseEvent};

/// Event type announcing the POST endpoint.
pub const ENDPOINT_EVENT: &str = "endpoint";

/// What a single event turned into.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Dispatched {
    /// The send target was replaced.
    Endpoint(Url),
    /// A message was decoded; `delivered` is false when no handler was registered.
    Message {
        kind: MessageKind,
        delivered: bool,
    },
    /// The event was dropped (malformed envelope or endpoint).
    Dropped,
    /// Unknown event type or keep-alive.
    Ignored,
}

/// Applies completed events to the session's shared state.
///
/// Lives on the I/O task. The handler is cloned out of its lock before it is
/// invoked, so a handler may call back into the transport.
pub(crate) struct EventDispatcher {
    stream_url: Url,
    endpoint: Arc<watch::Sender<Option<Url>>>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
    metrics: Arc<AtomicMetrics>,
}

impl EventDispatcher {
    pub(crate) fn new(
        stream_url: Url,
        endpoint: Arc<watch::Sender<Option<Url>>>,
        handler: Arc<RwLock<Option<MessageHandler>>>,
        metrics: Arc<AtomicMetrics>,
    ) -> Self {
        Self {
            stream_url,
            endpoint,
            handler,
            metrics,
        }
    }

    pub(crate) fn dispatch(&self, event: &SseEvent) -> Dispatched {
        match event.event_type.as_str() {
            ENDPOINT_EVENT => self.apply_endpoint(event.payload()),
            DEFAULT_EVENT_TYPE => self.deliver(event),
            other => {
                debug!(event_type = other, "ignoring SSE event");
                Dispatched::Ignored
            }
        }
    }

    fn apply_endpoint(&self, data: &str) -> Dispatched {
        match resolve_endpoint(&self.stream_url, data) {
            Ok(url) => {
                self.endpoint.send_replace(Some(url.clone()));
                AtomicMetrics::incr(&self.metrics.endpoint_updates);
                Dispatched::Endpoint(url)
            }
            Err(e) => {
                warn!(error = %e, "ignoring unusable endpoint announcement");
                AtomicMetrics::incr(&self.metrics.parse_errors);
                Dispatched::Dropped
            }
        }
    }

    fn deliver(&self, event: &SseEvent) -> Dispatched {
        if event.data.trim().is_empty() {
            trace!("skipping empty message event");
            return Dispatched::Ignored;
        }

        let message = match Message::from_slice(event.data.as_bytes()) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, id = ?event.id, "dropping malformed message event");
                AtomicMetrics::incr(&self.metrics.malformed_messages);
                return Dispatched::Dropped;
            }
        };

        let kind = message.kind();
        self.metrics.record_received();
        let handler = self.handler.read().clone();
        let delivered = match handler {
            Some(handler) => {
                trace!(%kind, "dispatching message");
                handler(message);
                true
            }
            None => {
                debug!(%kind, "no message handler registered, dropping message");
                false
            }
        };
        Dispatched::Message { kind, delivered }
    }
}

/// Turn the data of an `endpoint` event into an absolute URL.
///
/// Accepts a plain URI (absolute, or relative to the stream URL) or a JSON object
/// carrying it under `uri` or `endpoint`.
pub fn resolve_endpoint(stream_url: &Url, data: &str) -> TransportResult<Url> {
    let data = data.trim();
    if data.is_empty() {
        return Err(TransportError::ParseError("empty endpoint event".to_string()));
    }

    if data.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| TransportError::ParseError(format!("invalid endpoint JSON: {}", e)))?;
        let uri = value
            .get("uri")
            .or_else(|| value.get("endpoint"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                TransportError::ParseError("endpoint JSON has no `uri` field".to_string())
            })?;
        return resolve_endpoint(stream_url, uri);
    }

    let url = stream_url
        .join(data)
        .map_err(|e| TransportError::ParseError(format!("invalid endpoint `{}`: {}", data, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportError::ParseError(format!(
            "unsupported endpoint scheme `{}`",
            other
        ))),
    }
}
