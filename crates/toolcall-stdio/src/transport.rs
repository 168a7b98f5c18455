//! Standard I/O transport implementation.
//!
//! Newline-delimited JSON-RPC over a child process's stdin/stdout, or over any
//! pair of async byte streams.
//!
//! # Interior Mutability Pattern
//!
//! - **parking_lot::Mutex** for state and the handler slot (short-lived, never cross .await)
//! - **AtomicMetrics** for lock-free counter updates
//! - **tokio::sync::Mutex** for the writer, the child and the task handle (held across .await)

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use toolcall_protocol::Message;
use toolcall_transport_traits::{
    AtomicMetrics, LimitsConfig, MessageHandler, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType, validate_request_size,
    validate_response_size,
};
use tracing::{debug, error, info, trace, warn};

type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + 'static>>;
type LineReader = FramedRead<BoxedAsyncRead, LinesCodec>;
type LineWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;

/// How long `stop` waits for a child to exit after its stdin is closed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Where the streams come from; consumed by `start`.
enum StreamSource {
    /// Spawned on start with piped stdin/stdout.
    Command(Box<Command>),
    /// Already-open streams.
    Raw {
        reader: BoxedAsyncRead,
        writer: BoxedAsyncWrite,
    },
    /// Taken by a previous `start`.
    Consumed,
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(command) => f.debug_tuple("Command").field(command).finish(),
            Self::Raw { .. } => write!(f, "Raw"),
            Self::Consumed => write!(f, "Consumed"),
        }
    }
}

/// Standard I/O transport implementation
///
/// # Examples
///
/// ```rust,no_run
/// use tokio::process::Command;
/// use toolcall_stdio::StdioTransport;
/// use toolcall_transport_traits::Transport;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut command = Command::new("my-mcp-server");
/// command.arg("--verbose");
///
/// let transport = StdioTransport::from_command(command);
/// transport.start().await?;
/// // ... exchange messages ...
/// transport.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct StdioTransport {
    source: Mutex<StreamSource>,
    limits: LimitsConfig,
    shutdown_grace: Duration,

    state: Arc<Mutex<TransportState>>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
    metrics: Arc<AtomicMetrics>,

    writer: TokioMutex<Option<LineWriter>>,
    child: TokioMutex<Option<Child>>,
    task: TokioMutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioTransport")
            .field("source", &*self.source.lock())
            .field("state", &*self.state.lock())
            .field("limits", &self.limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    fn with_source(source: StreamSource) -> Self {
        Self {
            source: Mutex::new(source),
            limits: LimitsConfig::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            state: Arc::new(Mutex::new(TransportState::Idle)),
            handler: Arc::new(RwLock::new(None)),
            metrics: Arc::new(AtomicMetrics::new()),
            writer: TokioMutex::new(None),
            child: TokioMutex::new(None),
            task: TokioMutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Transport that spawns `command` on `start` and kills it on `stop`.
    ///
    /// stdin and stdout are piped; stderr is inherited so the server's logs stay visible.
    pub fn from_command(command: Command) -> Self {
        Self::with_source(StreamSource::Command(Box::new(command)))
    }

    /// Create a stdio transport from raw async read/write streams.
    ///
    /// When talking to a child process, `reader` is the child's **stdout** and
    /// `writer` its **stdin**.
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self::with_source(StreamSource::Raw {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
        })
    }

    /// Replace the size limits applied to each line.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// How long `stop` lets the child exit on its own before killing it.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    fn open_streams(&self) -> TransportResult<(BoxedAsyncRead, BoxedAsyncWrite, Option<Child>)> {
        let source = std::mem::replace(&mut *self.source.lock(), StreamSource::Consumed);
        match source {
            StreamSource::Command(mut command) => {
                command
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(true);
                let mut child = command.spawn().map_err(|e| {
                    TransportError::ConnectionFailed(format!("failed to spawn server: {}", e))
                })?;
                let stdin = child.stdin.take().ok_or_else(|| {
                    TransportError::ConfigurationError("child stdin was not piped".to_string())
                })?;
                let stdout = child.stdout.take().ok_or_else(|| {
                    TransportError::ConfigurationError("child stdout was not piped".to_string())
                })?;
                debug!(pid = ?child.id(), "spawned stdio server");
                Ok((Box::pin(stdout), Box::pin(stdin), Some(child)))
            }
            StreamSource::Raw { reader, writer } => Ok((reader, writer, None)),
            StreamSource::Consumed => Err(TransportError::NotAvailable(
                "stdio streams already consumed".to_string(),
            )),
        }
    }

    async fn write_line(&self, message: Message) -> TransportResult<()> {
        let state = *self.state.lock();
        if !state.is_running() {
            return Err(TransportError::NotAvailable(format!(
                "stdio transport is {}",
                state
            )));
        }

        // compact serde_json output escapes control characters, so one message is one line
        let line = serde_json::to_string(&message)?;
        let size = line.len();
        validate_request_size(size, &self.limits)?;

        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::NotAvailable(
                "stdin writer not available".to_string(),
            ));
        };
        if let Err(e) = writer.send(line).await {
            error!("Failed to send message: {}", e);
            return Err(TransportError::SendFailed(e.to_string()));
        }

        self.metrics.record_sent(size);
        trace!(kind = %message.kind(), size, "sent message");
        Ok(())
    }
}

impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
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
                state if state.is_running() => return Ok(()),
                _ => {}
            }

            let (reader, writer, child) = match self.open_streams() {
                Ok(streams) => streams,
                Err(e) => {
                    AtomicMetrics::incr(&self.metrics.failed_connections);
                    error!("Failed to start stdio transport: {}", e);
                    return Err(e);
                }
            };

            *self.writer.lock().await = Some(FramedWrite::new(writer, LinesCodec::new()));
            *self.child.lock().await = child;

            AtomicMetrics::incr(&self.metrics.connections);
            self.metrics.active_connections.fetch_add(1, Ordering::Relaxed);
            set_state(&self.state, TransportState::Streaming);

            let worker = LineWorker {
                handler: Arc::clone(&self.handler),
                metrics: Arc::clone(&self.metrics),
                state: Arc::clone(&self.state),
                limits: self.limits.clone(),
                cancel: self.cancel.clone(),
            };
            let lines = FramedRead::new(reader, LinesCodec::new());
            *task = Some(tokio::spawn(worker.run(lines)));
            info!("stdio transport started");
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
                error!("stdio reader task panicked: {}", e);
            }

            // closing stdin is the polite shutdown signal for a stdio server
            if let Some(mut writer) = self.writer.lock().await.take()
                && let Err(e) = SinkExt::<String>::close(&mut writer).await
            {
                debug!("closing stdin failed: {}", e);
            }

            if let Some(mut child) = self.child.lock().await.take() {
                match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                    Ok(Ok(status)) => debug!(%status, "stdio server exited"),
                    Ok(Err(e)) => warn!("waiting for stdio server failed: {}", e),
                    Err(_) => {
                        warn!(grace = ?self.shutdown_grace, "stdio server did not exit, killing it");
                        if let Err(e) = child.kill().await {
                            error!("failed to kill stdio server: {}", e);
                        }
                    }
                }
            }

            let previous = std::mem::replace(&mut *self.state.lock(), TransportState::Stopped);
            if previous != TransportState::Stopped {
                info!("stdio transport stopped");
            }
            Ok(())
        })
    }

    fn send(
        &self,
        message: Message,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(self.write_line(message))
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.write() = Some(handler);
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    fn endpoint(&self) -> Option<String> {
        Some("stdio://".to_string())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // kill_on_drop reaps a spawned child
        self.cancel.cancel();
    }
}

fn set_state(state: &Mutex<TransportState>, next: TransportState) {
    let mut state = state.lock();
    if *state != TransportState::Stopped {
        trace!("stdio transport state: {} -> {}", *state, next);
        *state = next;
    }
}

/// Background reader: one JSON-RPC envelope per line.
struct LineWorker {
    handler: Arc<RwLock<Option<MessageHandler>>>,
    metrics: Arc<AtomicMetrics>,
    state: Arc<Mutex<TransportState>>,
    limits: LimitsConfig,
    cancel: CancellationToken,
}

impl LineWorker {
    async fn run(self, mut lines: LineReader) {
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => break,
                next = lines.next() => next,
            };
            match next {
                Some(Ok(line)) => self.handle_line(&line),
                Some(Err(e)) => {
                    error!("Failed to read from stdio server: {}", e);
                    set_state(&self.state, TransportState::Stopped);
                    break;
                }
                None => {
                    info!("stdio server closed its output");
                    set_state(&self.state, TransportState::Stopped);
                    break;
                }
            }
        }

        self.metrics.active_connections.fetch_sub(1, Ordering::Relaxed);
        debug!("stdio reader task completed");
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.metrics
            .bytes_received
            .fetch_add(line.len() as u64, Ordering::Relaxed);

        if self.limits.enforce_on_streams
            && let Err(e) = validate_response_size(line.len(), &self.limits)
        {
            warn!("Skipping oversized line: {}", e);
            AtomicMetrics::incr(&self.metrics.parse_errors);
            return;
        }

        let message = match Message::from_slice(line.as_bytes()) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed line");
                AtomicMetrics::incr(&self.metrics.malformed_messages);
                return;
            }
        };

        self.metrics.record_received();
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => handler(message),
            None => debug!(kind = %message.kind(), "no message handler registered, dropping message"),
        }
    }
}
