//! SSE transport session.
//!
//! A background task owns the streaming GET and the [`SseParser`]; completed
//! events go through the [`EventDispatcher`], which publishes endpoint
//! announcements and hands decoded messages to the registered handler.
//! Outbound messages are POSTed to the most recently announced endpoint from the
//! caller's task.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolcall_protocol::Message;
use toolcall_transport_traits::{
    AtomicMetrics, ByteStream, HttpConnector, LimitsConfig, MessageHandler, TimeoutConfig,
    Transport, TransportError, TransportMetrics, TransportResult, TransportState, TransportType,
    validate_request_size,
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::config::SseClientConfig;
use crate::connector::ReqwestConnector;
use crate::dispatcher::{Dispatched, EventDispatcher};
use crate::retry::RetryPolicy;
use crate::sse::SseParser;

/// Client side of an SSE session: event stream in, POST out.
pub struct SseTransport {
    config: SseClientConfig,
    stream_url: Url,
    connector: Arc<dyn HttpConnector>,

    state: Arc<Mutex<TransportState>>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
    endpoint: Arc<watch::Sender<Option<Url>>>,
    last_event_id: Arc<Mutex<Option<String>>>,
    retry_hint: Arc<Mutex<Option<u64>>>,
    metrics: Arc<AtomicMetrics>,

    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseTransport")
            .field("url", &self.stream_url.as_str())
            .field("state", &*self.state.lock())
            .field("endpoint", &self.endpoint())
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

impl SseTransport {
    /// Create a transport that talks HTTP through `reqwest`.
    pub fn new(config: SseClientConfig) -> TransportResult<Self> {
        let connector = Arc::new(ReqwestConnector::new(&config)?);
        Self::with_connector(config, connector)
    }

    /// Create a transport on top of an existing HTTP connector.
    pub fn with_connector(
        config: SseClientConfig,
        connector: Arc<dyn HttpConnector>,
    ) -> TransportResult<Self> {
        let stream_url = Url::parse(&config.url).map_err(|e| {
            TransportError::ConfigurationError(format!("invalid stream URL `{}`: {}", config.url, e))
        })?;
        if !matches!(stream_url.scheme(), "http" | "https") {
            return Err(TransportError::ConfigurationError(format!(
                "stream URL must be http or https, got `{}`",
                stream_url.scheme()
            )));
        }

        Ok(Self {
            config,
            stream_url,
            connector,
            state: Arc::new(Mutex::new(TransportState::Idle)),
            handler: Arc::new(RwLock::new(None)),
            endpoint: Arc::new(watch::Sender::new(None)),
            last_event_id: Arc::new(Mutex::new(None)),
            retry_hint: Arc::new(Mutex::new(None)),
            metrics: Arc::new(AtomicMetrics::new()),
            task: tokio::sync::Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    /// The configuration this transport was created with.
    pub fn config(&self) -> &SseClientConfig {
        &self.config
    }

    /// Current POST target, if one has been announced.
    pub fn endpoint_url(&self) -> Option<Url> {
        self.endpoint.borrow().as_ref().cloned()
    }

    /// Id of the most recent event that carried one; sent as `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().clone()
    }

    /// Most recent `retry:` hint from the server.
    ///
    /// Recorded for callers; the reconnect delay comes from the configured
    /// [`RetryPolicy`].
    pub fn retry_hint(&self) -> Option<Duration> {
        self.retry_hint.lock().map(Duration::from_millis)
    }

    /// Wait until the server has announced an endpoint.
    ///
    /// Returns immediately when one is already known.
    pub async fn wait_for_endpoint(&self, timeout: Duration) -> TransportResult<Url> {
        let mut rx = self.endpoint.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(endpoint)) => Option::clone(&endpoint).ok_or(TransportError::NoEndpoint),
            Ok(Err(_)) => Err(TransportError::NoEndpoint),
            Err(_) => Err(TransportError::ConnectionTimeout {
                operation: "waiting for endpoint announcement".to_string(),
                timeout,
            }),
        }
    }

    async fn post_message(&self, message: Message) -> TransportResult<()> {
        if *self.state.lock() == TransportState::Stopped {
            return Err(TransportError::NotAvailable(
                "transport has been stopped".to_string(),
            ));
        }
        let endpoint = self
            .endpoint
            .borrow()
            .as_ref()
            .cloned()
            .ok_or(TransportError::NoEndpoint)?;

        let body = message.to_vec()?;
        validate_request_size(body.len(), &self.config.limits)?;
        let size = body.len();

        trace!(kind = %message.kind(), %endpoint, size, "posting message");
        let started = Instant::now();
        let post = self.connector.post(endpoint.as_str(), Bytes::from(body));
        let response = match self.config.timeouts.request {
            Some(timeout) => tokio::time::timeout(timeout, post).await.map_err(|_| {
                TransportError::RequestTimeout {
                    operation: format!("POST {}", endpoint),
                    timeout,
                }
            })??,
            None => post.await?,
        };

        if !response.is_success() {
            warn!(%endpoint, status = response.status, "POST rejected");
            return Err(TransportError::SendFailed(format!(
                "POST {} returned status {}",
                endpoint, response.status
            )));
        }

        self.metrics.record_sent(size);
        self.metrics
            .update_latency_us(started.elapsed().as_micros() as u64);
        self.deliver_inline_reply(&response.body);
        Ok(())
    }

    /// Servers may answer a POST directly instead of over the stream.
    fn deliver_inline_reply(&self, body: &[u8]) {
        if body.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        match Message::from_slice(body) {
            Ok(message) => {
                self.metrics.record_received();
                let handler = self.handler.read().clone();
                if let Some(handler) = handler {
                    handler(message);
                }
            }
            Err(e) => debug!(error = %e, "POST response body is not a JSON-RPC message"),
        }
    }
}

impl Transport for SseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    fn start(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let mut task = self.task.lock().await;
            let state = *self.state.lock();
            match state {
                TransportState::Stopped => {
                    return Err(TransportError::NotAvailable(
                        "transport has been stopped".to_string(),
                    ));
                }
                state if state.is_running() => {
                    debug!(%state, "SSE transport already running");
                    return Ok(());
                }
                _ => {}
            }

            set_state(&self.state, TransportState::Connecting);
            let worker = StreamWorker {
                stream_url: self.stream_url.clone(),
                connector: Arc::clone(&self.connector),
                dispatcher: EventDispatcher::new(
                    self.stream_url.clone(),
                    Arc::clone(&self.endpoint),
                    Arc::clone(&self.handler),
                    Arc::clone(&self.metrics),
                ),
                state: Arc::clone(&self.state),
                last_event_id: Arc::clone(&self.last_event_id),
                retry_hint: Arc::clone(&self.retry_hint),
                metrics: Arc::clone(&self.metrics),
                retry_policy: self.config.retry_policy.clone(),
                timeouts: self.config.timeouts.clone(),
                limits: self.config.limits.clone(),
                cancel: self.cancel.clone(),
            };
            *task = Some(tokio::spawn(worker.run()));
            info!(url = %self.stream_url, "SSE transport started");
            Ok(())
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            let mut task = self.task.lock().await;
            self.cancel.cancel();
            if let Some(handle) = task.take()
                && let Err(e) = handle.await
                && e.is_panic()
            {
                error!("SSE stream task panicked: {}", e);
            }

            let previous = std::mem::replace(&mut *self.state.lock(), TransportState::Stopped);
            if previous != TransportState::Stopped {
                info!(url = %self.stream_url, "SSE transport stopped");
            }
            Ok(())
        })
    }

    fn send(
        &self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(self.post_message(message))
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.write() = Some(handler);
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    fn wait_ready(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move { self.wait_for_endpoint(timeout).await.map(|_| ()) })
    }

    fn endpoint(&self) -> Option<String> {
        self.endpoint.borrow().as_ref().map(Url::to_string)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        // the task exits at its next cancellation point; stop() is the joined path
        self.cancel.cancel();
    }
}

/// Move to `next` unless the session was already stopped.
fn set_state(state: &Mutex<TransportState>, next: TransportState) {
    let mut state = state.lock();
    if *state != TransportState::Stopped {
        *state = next;
    }
}

/// The background half of the session.
struct StreamWorker {
    stream_url: Url,
    connector: Arc<dyn HttpConnector>,
    dispatcher: EventDispatcher,
    state: Arc<Mutex<TransportState>>,
    last_event_id: Arc<Mutex<Option<String>>>,
    retry_hint: Arc<Mutex<Option<u64>>>,
    metrics: Arc<AtomicMetrics>,
    retry_policy: RetryPolicy,
    timeouts: TimeoutConfig,
    limits: LimitsConfig,
    cancel: CancellationToken,
}

impl StreamWorker {
    async fn run(self) {
        // consecutive failed connection attempts
        let mut failures: u32 = 0;

        while !self.cancel.is_cancelled() {
            set_state(&self.state, TransportState::Connecting);
            let outcome = self.run_connection(&mut failures).await;
            if self.cancel.is_cancelled() {
                break;
            }

            match outcome {
                Ok(()) => info!(url = %self.stream_url, "event stream closed by server"),
                Err(e) if !e.is_recoverable() => {
                    error!(error = %e, "event stream failed permanently");
                    set_state(&self.state, TransportState::Stopped);
                    break;
                }
                Err(e) => warn!(error = %e, "event stream interrupted"),
            }

            let Some(delay) = self.retry_policy.delay(failures) else {
                error!(attempts = failures, "giving up on event stream reconnect");
                set_state(&self.state, TransportState::Stopped);
                break;
            };
            failures = failures.saturating_add(1);
            AtomicMetrics::incr(&self.metrics.reconnects);
            debug!(?delay, attempt = failures, "reconnecting event stream");

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        debug!(url = %self.stream_url, "SSE stream task exited");
    }

    /// One connection: open, then pump until it ends, fails or is cancelled.
    async fn run_connection(&self, failures: &mut u32) -> TransportResult<()> {
        let resume_from = self
            .last_event_id
            .lock()
            .clone()
            .filter(|id| !id.is_empty());

        let open = self
            .connector
            .open_stream(self.stream_url.as_str(), resume_from.as_deref());
        let opened = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            opened = tokio::time::timeout(self.timeouts.connect, open) => opened,
        };
        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                AtomicMetrics::incr(&self.metrics.failed_connections);
                return Err(e);
            }
            Err(_) => {
                AtomicMetrics::incr(&self.metrics.failed_connections);
                return Err(TransportError::ConnectionTimeout {
                    operation: format!("GET {}", self.stream_url),
                    timeout: self.timeouts.connect,
                });
            }
        };

        *failures = 0;
        AtomicMetrics::incr(&self.metrics.connections);
        self.metrics.active_connections.fetch_add(1, Ordering::Relaxed);
        set_state(&self.state, TransportState::Streaming);
        info!(url = %self.stream_url, resumed_from = ?resume_from, "event stream connected");

        let result = self.pump(&mut stream, resume_from).await;
        self.metrics.active_connections.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn pump(
        &self,
        stream: &mut ByteStream,
        resume_from: Option<String>,
    ) -> TransportResult<()> {
        let mut parser = SseParser::with_last_event_id(resume_from);
        let line_limit = self.limits.stream_line_limit();
        let mut invalid_seen = 0;

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                next = next_chunk(stream, self.timeouts.read) => next?,
            };
            let Some(chunk) = next else {
                return Ok(());
            };
            self.metrics
                .bytes_received
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);

            for event in parser.feed(&chunk) {
                match self.dispatcher.dispatch(&event) {
                    Dispatched::Endpoint(url) => info!(endpoint = %url, "endpoint announced"),
                    Dispatched::Message { kind, delivered } => {
                        trace!(%kind, delivered, id = ?event.id, "message event dispatched");
                    }
                    Dispatched::Dropped | Dispatched::Ignored => {}
                }
            }
            // `id:` counts once parsed, dispatched or not
            if let Some(id) = parser.last_event_id() {
                *self.last_event_id.lock() = Some(id.to_string());
            }

            let invalid = parser.invalid_lines();
            if invalid > invalid_seen {
                self.metrics
                    .parse_errors
                    .fetch_add(invalid - invalid_seen, Ordering::Relaxed);
                invalid_seen = invalid;
            }
            if let Some(hint) = parser.retry_hint() {
                *self.retry_hint.lock() = Some(hint);
            }

            if let Some(max) = line_limit {
                let size = parser.pending_len();
                if size > max {
                    return Err(TransportError::ResponseTooLarge { size, max });
                }
            }
        }
    }
}

async fn next_chunk(
    stream: &mut ByteStream,
    idle: Option<Duration>,
) -> TransportResult<Option<Bytes>> {
    let next = match idle {
        Some(idle) => tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                operation: "reading event stream".to_string(),
                timeout: idle,
            })?,
        None => stream.next().await,
    };
    next.transpose()
}
