//! The handshake-gated client.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use toolcall_protocol::{
    CallToolParams, CallToolResult, Handshake, InitializeParams, InitializeResult,
    ListToolsParams, ListToolsResult, Notification, ProtocolError, Request, RequestId,
    Response, Tool, methods,
};
use toolcall_transport_traits::{MessageHandler, Transport, TransportError, TransportState};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::router::ResponseRouter;

/// MCP client over any [`Transport`].
///
/// Owns the initialize handshake and request/response correlation. Every call other
/// than `initialize` is refused until the handshake has completed.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use toolcall_client::{Client, ClientConfig};
/// use toolcall_http::{SseClientConfig, SseTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = SseTransport::new(SseClientConfig::new("http://localhost:8080/sse"))?;
/// let client = Client::new(Arc::new(transport), ClientConfig::default());
///
/// let server = client.initialize().await?;
/// println!("Connected to {} {}", server.server_info.name, server.server_info.version);
///
/// for tool in client.list_tools().await? {
///     println!("Tool: {} - {}", tool.name, tool.description.as_deref().unwrap_or("No description"));
/// }
/// let result = client
///     .call_tool("echo", Some(serde_json::json!({"text": "hi"})))
///     .await?;
/// println!("{:?}", result.content);
///
/// client.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    handshake: Mutex<Handshake>,
    router: Arc<ResponseRouter>,
    next_id: AtomicI64,
    shut_down: AtomicBool,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("handshake", &self.handshake.lock().state())
            .field("router", &self.router)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client and take over the transport's message callback.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let router = Arc::new(ResponseRouter::new());

        // weak: the transport owns this callback
        let replies = Arc::downgrade(&transport);
        let routing = Arc::clone(&router);
        transport.set_message_handler(Arc::new(move |message| {
            let Some(reply) = routing.route(message) else {
                return;
            };
            let (Some(transport), Ok(runtime)) =
                (replies.upgrade(), tokio::runtime::Handle::try_current())
            else {
                debug!(id = %reply.id, "no runtime to answer server request");
                return;
            };
            runtime.spawn(async move {
                if let Err(e) = transport.send(reply.into()).await {
                    warn!("failed to answer server request: {}", e);
                }
            });
        }));

        Self {
            handshake: Mutex::new(Handshake::new(config.protocol_version.clone())),
            transport,
            config,
            router,
            next_id: AtomicI64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Receive server requests and notifications.
    ///
    /// Without a handler, `ping` is answered and other server requests are rejected
    /// with `method not found`. With one, the handler owns replies (see [`Client::respond`]).
    pub fn set_inbound_handler(&self, handler: MessageHandler) {
        self.router.set_inbound_handler(handler);
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns `true` once the three-step handshake has completed.
    pub fn is_initialized(&self) -> bool {
        self.handshake.lock().is_initialized()
    }

    /// What the server reported during the handshake.
    pub fn server_info(&self) -> Option<InitializeResult> {
        self.handshake.lock().server().cloned()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.router.pending()
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ensure_open(&self) -> ClientResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }
        Ok(())
    }

    /// Run the initialize handshake: `initialize` request, its response, then the
    /// `initialized` notification.
    ///
    /// Starts the transport if it is idle and waits up to
    /// [`ClientConfig::endpoint_wait`] for it to become ready.
    pub async fn initialize(&self) -> ClientResult<InitializeResult> {
        self.ensure_open()?;
        if self.transport.state() == TransportState::Idle {
            self.transport.start().await?;
        }
        self.transport.wait_ready(self.config.endpoint_wait).await?;

        let id = self.next_request_id();
        let params = InitializeParams {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.client_info.clone(),
        };
        let request = Request::initialize(id.clone(), &params)?;
        self.handshake.lock().begin(id)?;

        let server = match self.exchange(request).await {
            Ok(response) => {
                let accepted = self.handshake.lock().accept(response).cloned();
                accepted.map_err(ClientError::from)
            }
            Err(e) => Err(e),
        };
        let server = match server {
            Ok(server) => server,
            Err(e) => {
                self.handshake.lock().reset();
                return Err(e);
            }
        };

        self.handshake.lock().check(methods::INITIALIZED)?;
        if let Err(e) = self
            .transport
            .send(Notification::initialized().into())
            .await
        {
            self.handshake.lock().reset();
            return Err(e.into());
        }
        self.handshake.lock().complete()?;

        info!(
            server = %server.server_info.name,
            version = %server.server_info.version,
            protocol = %server.protocol_version,
            "client initialized"
        );
        Ok(server)
    }

    /// Send a request and wait for its result.
    pub async fn request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.ensure_open()?;
        if method == methods::INITIALIZE {
            return Err(ProtocolError::ProtocolViolation(
                "use Client::initialize to run the handshake".to_string(),
            )
            .into());
        }
        self.handshake.lock().check(method)?;

        let request = Request::new(self.next_request_id(), method, params);
        let response = self.exchange(request).await?;
        response.into_result().map_err(ClientError::Rpc)
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        self.ensure_open()?;
        if method == methods::INITIALIZED {
            return Err(ProtocolError::ProtocolViolation(
                "`initialized` is sent by Client::initialize".to_string(),
            )
            .into());
        }
        self.handshake.lock().check(method)?;
        self.transport
            .send(Notification::new(method, params).into())
            .await?;
        Ok(())
    }

    /// Answer a server request received through the inbound handler.
    pub async fn respond(&self, response: Response) -> ClientResult<()> {
        self.ensure_open()?;
        self.transport.send(response.into()).await?;
        Ok(())
    }

    /// Round-trip a `ping`.
    pub async fn ping(&self) -> ClientResult<()> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// List every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> ClientResult<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = ListToolsParams {
                cursor: cursor.clone(),
            };
            let page: ListToolsResult = self
                .call(methods::TOOLS_LIST, Some(to_params(&params)?))
                .await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!(cursor = %next, "server repeated a pagination cursor, stopping");
                    break;
                }
                _ => break,
            }
        }
        debug!(count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Invoke a tool.
    ///
    /// A tool that reports failure still returns `Ok`; check
    /// [`CallToolResult::is_error`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> ClientResult<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self
            .call(methods::TOOLS_CALL, Some(to_params(&params)?))
            .await?;
        if result.is_error() {
            debug!(tool = name, "tool reported an error");
        }
        Ok(result)
    }

    /// Stop the transport and fail every outstanding call.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) -> ClientResult<()> {
        self.shut_down.store(true, Ordering::Release);
        let stop = self.transport.stop().await;
        let failed = self.router.fail_all();
        if failed > 0 {
            debug!(failed, "failed outstanding requests on shutdown");
        }
        self.handshake.lock().reset();
        stop.map_err(ClientError::from)
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> ClientResult<R> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| ClientError::InvalidResult {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Send `request` and wait for the response with the same id.
    async fn exchange(&self, request: Request) -> ClientResult<Response> {
        let id = request.id.clone();
        let method = request.method.clone();

        // register before sending so an immediate answer is not lost
        let receiver = self.router.wait_for_response(id.clone());
        if let Err(e) = self.transport.send(request.into()).await {
            self.router.forget(&id);
            return Err(e.into());
        }

        let received = match self.config.timeouts.request {
            Some(timeout) => match tokio::time::timeout(timeout, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    self.router.forget(&id);
                    return Err(TransportError::RequestTimeout {
                        operation: format!("{}()", method),
                        timeout,
                    }
                    .into());
                }
            },
            None => receiver.await,
        };
        received.map_err(|_| ClientError::Shutdown)
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> ClientResult<Value> {
    serde_json::to_value(params)
        .map_err(|e| ClientError::Protocol(ProtocolError::from(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use parking_lot::RwLock;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use toolcall_protocol::{JsonRpcError, Message, MessageKind};
    use toolcall_transport_traits::{TransportMetrics, TransportResult, TransportType};

    type Script = Box<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

    /// In-memory server: answers requests synchronously through the handler.
    struct ScriptedServer {
        state: Mutex<TransportState>,
        handler: RwLock<Option<MessageHandler>>,
        sent: Mutex<Vec<Message>>,
        script: Script,
        fail_sends: AtomicBool,
    }

    impl fmt::Debug for ScriptedServer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ScriptedServer").finish_non_exhaustive()
        }
    }

    impl ScriptedServer {
        fn new(script: impl Fn(&Request) -> Option<Response> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(TransportState::Idle),
                handler: RwLock::new(None),
                sent: Mutex::new(Vec::new()),
                script: Box::new(script),
                fail_sends: AtomicBool::new(false),
            })
        }

        /// Deliver a server-initiated message.
        fn push(&self, message: Message) {
            let handler = self.handler.read().clone();
            if let Some(handler) = handler {
                handler(message);
            }
        }

        fn sent(&self) -> Vec<Message> {
            self.sent.lock().clone()
        }
    }

    impl Transport for ScriptedServer {
        fn transport_type(&self) -> TransportType {
            TransportType::Stdio
        }

        fn state(&self) -> TransportState {
            *self.state.lock()
        }

        fn start(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
            *self.state.lock() = TransportState::Streaming;
            Box::pin(async { Ok(()) })
        }

        fn stop(&self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
            *self.state.lock() = TransportState::Stopped;
            Box::pin(async { Ok(()) })
        }

        fn send(
            &self,
            message: Message,
        ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
            Box::pin(async move {
                if self.fail_sends.load(Ordering::Relaxed) {
                    return Err(TransportError::ConnectionFailed("offline".to_string()));
                }
                self.sent.lock().push(message.clone());
                if let Message::Request(request) = &message
                    && let Some(reply) = (self.script)(request)
                {
                    self.push(reply.into());
                }
                Ok(())
            })
        }

        fn set_message_handler(&self, handler: MessageHandler) {
            *self.handler.write() = Some(handler);
        }

        fn metrics(&self) -> TransportMetrics {
            TransportMetrics::default()
        }
    }

    fn initialize_result() -> Value {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {"listChanged": true}},
            "serverInfo": {"name": "weather", "version": "1.2.0"}
        })
    }

    /// Answers initialize, tools and ping; never answers `slow`.
    fn standard_server() -> Arc<ScriptedServer> {
        ScriptedServer::new(|request| {
            let id = request.id.clone();
            match request.method.as_str() {
                "initialize" => Some(Response::success(id, initialize_result())),
                "ping" => Some(Response::success(id, json!({}))),
                "tools/list" => {
                    let cursor = request
                        .params
                        .as_ref()
                        .and_then(|p| p.get("cursor"))
                        .and_then(Value::as_str);
                    let page = match cursor {
                        None => json!({
                            "tools": [{"name": "forecast", "inputSchema": {"type": "object"}}],
                            "nextCursor": "page-2"
                        }),
                        Some("page-2") => json!({
                            "tools": [{"name": "alerts", "description": "Active alerts"}]
                        }),
                        Some(other) => panic!("unexpected cursor {other}"),
                    };
                    Some(Response::success(id, page))
                }
                "tools/call" => {
                    let params = request.params.clone().unwrap_or_default();
                    if params["name"] == "explode" {
                        return Some(Response::success(
                            id,
                            json!({"content": [{"type": "text", "text": "boom"}], "isError": true}),
                        ));
                    }
                    Some(Response::success(
                        id,
                        json!({"content": [{"type": "text", "text": params["arguments"]["city"]}]}),
                    ))
                }
                "slow" => None,
                other => Some(Response::error_response(
                    id,
                    JsonRpcError::method_not_found(other),
                )),
            }
        })
    }

    fn client(server: &Arc<ScriptedServer>, config: ClientConfig) -> Client {
        Client::new(Arc::clone(server) as Arc<dyn Transport>, config)
    }

    #[tokio::test]
    async fn test_initialize_runs_three_step_handshake() {
        let server = standard_server();
        let client = client(&server, ClientConfig::new("host", "0.9"));

        let result = client.initialize().await.unwrap();
        assert_eq!(result.server_info.name, "weather");
        assert!(result.capabilities.get("tools").unwrap().list_changed);
        assert!(client.is_initialized());
        assert_eq!(server.state(), TransportState::Streaming);

        let sent = server.sent();
        assert_eq!(sent.len(), 2);
        let Message::Request(init) = &sent[0] else {
            panic!("expected initialize request, got {:?}", sent[0]);
        };
        assert_eq!(init.method, "initialize");
        let params = init.params.as_ref().unwrap();
        assert_eq!(params["clientInfo"], json!({"name": "host", "version": "0.9"}));
        assert_eq!(params["protocolVersion"], "2024-11-05");
        assert_eq!(sent[1].kind(), MessageKind::Notification);
        assert_eq!(sent[1].method(), Some("initialized"));
    }

    #[tokio::test]
    async fn test_calls_before_initialize_are_refused() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::ProtocolViolation(_))
        ));
        let err = client.notify("notifications/cancelled", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        let err = client.request("initialize", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(server.sent().is_empty());
    }

    #[tokio::test]
    async fn test_initialized_notification_is_reserved() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        client.initialize().await.unwrap();
        let sent_before = server.sent().len();

        let err = client.notify("initialized", None).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::ProtocolViolation(_))
        ));
        assert_eq!(server.sent().len(), sent_before);

        client
            .notify("notifications/roots/list_changed", None)
            .await
            .unwrap();
        assert_eq!(server.sent().len(), sent_before + 1);
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        client.initialize().await.unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["forecast", "alerts"]);
        assert_eq!(tools[1].description.as_deref(), Some("Active alerts"));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_call_tool() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        client.initialize().await.unwrap();

        let result = client
            .call_tool("forecast", Some(json!({"city": "Oslo"})))
            .await
            .unwrap();
        assert!(!result.is_error());
        assert_eq!(result.content, vec![json!({"type": "text", "text": "Oslo"})]);

        let failed = client.call_tool("explode", None).await.unwrap();
        assert!(failed.is_error());
    }

    #[tokio::test]
    async fn test_server_error_is_rpc_error() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        client.initialize().await.unwrap();

        let err = client.request("resources/list", None).await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(-32601));
    }

    #[tokio::test]
    async fn test_request_timeout_retires_waiter() {
        let server = standard_server();
        let config = ClientConfig::default().with_request_timeout(Some(Duration::from_millis(30)));
        let client = client(&server, config);
        client.initialize().await.unwrap();

        let err = client.request("slow", None).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(client.pending_requests(), 0);
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_retires_waiter() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        client.initialize().await.unwrap();

        server.fail_sends.store(true, Ordering::Relaxed);
        let err = client.ping().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::ConnectionFailed(_))
        ));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_rejected_initialize_can_be_retried() {
        let attempts = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&attempts);
        let server = ScriptedServer::new(move |request| {
            if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                return Some(Response::error_response(
                    request.id.clone(),
                    JsonRpcError::internal_error("warming up"),
                ));
            }
            Some(Response::success(request.id.clone(), initialize_result()))
        });
        let client = client(&server, ClientConfig::default());

        let err = client.initialize().await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(!client.is_initialized());

        client.initialize().await.unwrap();
        assert!(client.is_initialized());
        assert_eq!(
            client.server_info().map(|s| s.server_info.version),
            Some("1.2.0".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_ping_is_answered() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        client.initialize().await.unwrap();

        server.push(Request::new("srv-1", "ping", None).into());
        tokio::time::timeout(Duration::from_secs(2), async {
            while !server
                .sent()
                .iter()
                .any(|m| m.kind() == MessageKind::Response)
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let reply = server
            .sent()
            .into_iter()
            .find_map(|m| match m {
                Message::Response(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(reply.id, RequestId::from("srv-1"));
        assert!(reply.is_success());
    }

    #[tokio::test]
    async fn test_inbound_handler_sees_notifications() {
        let server = standard_server();
        let client = client(&server, ClientConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.set_inbound_handler(Arc::new(move |m| {
            let _ = tx.send(m);
        }));
        client.initialize().await.unwrap();

        server.push(Notification::new("notifications/tools/list_changed", None).into());
        let seen = rx.recv().await.unwrap();
        assert_eq!(seen.method(), Some("notifications/tools/list_changed"));
    }

    #[tokio::test]
    async fn test_shutdown_fails_outstanding_calls() {
        let server = standard_server();
        let config = ClientConfig::default().with_request_timeout(None);
        let client = Arc::new(client(&server, config));
        client.initialize().await.unwrap();

        let waiting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request("slow", None).await })
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while client.pending_requests() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        client.shutdown().await.unwrap();
        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Shutdown));
        assert_eq!(server.state(), TransportState::Stopped);

        assert!(matches!(client.ping().await, Err(ClientError::Shutdown)));
        client.shutdown().await.unwrap();
    }
}
