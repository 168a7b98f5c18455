//! Routing of inbound messages.
//!
//! The transport hands every decoded message to a single callback. Responses are
//! matched to the waiting call by id through a oneshot channel registered before
//! the request is sent; server requests and notifications go to the optional
//! inbound handler.

use std::collections::HashMap;
use std::fmt;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use toolcall_protocol::{JsonRpcError, Message, Request, RequestId, Response, methods};
use toolcall_transport_traits::MessageHandler;
use tracing::{debug, trace, warn};

pub(crate) struct ResponseRouter {
    waiters: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
    inbound: RwLock<Option<MessageHandler>>,
}

impl fmt::Debug for ResponseRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseRouter")
            .field("pending", &self.pending())
            .field("has_inbound_handler", &self.inbound.read().is_some())
            .finish()
    }
}

impl ResponseRouter {
    pub(crate) fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            inbound: RwLock::new(None),
        }
    }

    /// Register interest in the response to `id`; call before sending the request.
    pub(crate) fn wait_for_response(&self, id: RequestId) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        if self.waiters.lock().insert(id.clone(), tx).is_some() {
            warn!(%id, "replaced an outstanding waiter with the same id");
        }
        rx
    }

    /// Retire a waiter whose call failed or timed out.
    pub(crate) fn forget(&self, id: &RequestId) {
        self.waiters.lock().remove(id);
    }

    /// Drop every waiter; their calls observe a closed channel.
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.waiters.lock().drain().collect();
        drained.len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.waiters.lock().len()
    }

    pub(crate) fn set_inbound_handler(&self, handler: MessageHandler) {
        *self.inbound.write() = Some(handler);
    }

    /// Route one inbound message.
    ///
    /// Returns the reply the client owes the server when nobody else will answer
    /// a server request.
    pub(crate) fn route(&self, message: Message) -> Option<Response> {
        match message {
            Message::Response(response) => {
                self.complete(response);
                None
            }
            Message::Request(request) => {
                let handler = self.inbound.read().clone();
                if let Some(handler) = handler {
                    handler(Message::Request(request));
                    return None;
                }
                Some(default_reply(&request))
            }
            Message::Notification(notification) => {
                let handler = self.inbound.read().clone();
                match handler {
                    Some(handler) => handler(Message::Notification(notification)),
                    None => trace!(method = %notification.method, "unhandled notification"),
                }
                None
            }
        }
    }

    fn complete(&self, response: Response) {
        let waiter = self.waiters.lock().remove(&response.id);
        match waiter {
            Some(tx) => {
                let id = response.id.clone();
                if tx.send(response).is_err() {
                    debug!(%id, "caller gave up before the response arrived");
                }
            }
            None => warn!(id = %response.id, "response does not match any outstanding request"),
        }
    }
}

/// Answer for a server request when the host registered no handler.
fn default_reply(request: &Request) -> Response {
    if request.method == methods::PING {
        return Response::success(request.id.clone(), serde_json::json!({}));
    }
    debug!(method = %request.method, "rejecting unsupported server request");
    Response::error_response(
        request.id.clone(),
        JsonRpcError::method_not_found(&request.method),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use toolcall_protocol::Notification;

    #[tokio::test]
    async fn test_response_reaches_its_waiter() {
        let router = ResponseRouter::new();
        let first = router.wait_for_response(RequestId::from(1));
        let second = router.wait_for_response(RequestId::from(2));

        router.route(Response::success(2, serde_json::json!("two")).into());
        router.route(Response::success(1, serde_json::json!("one")).into());

        assert_eq!(first.await.unwrap().result(), Some(&serde_json::json!("one")));
        assert_eq!(second.await.unwrap().result(), Some(&serde_json::json!("two")));
        assert_eq!(router.pending(), 0);
    }

    #[test]
    fn test_unmatched_response_is_dropped() {
        let router = ResponseRouter::new();
        let _rx = router.wait_for_response(RequestId::from(1));
        assert!(router.route(Response::success(9, serde_json::json!({})).into()).is_none());
        assert_eq!(router.pending(), 1);
    }

    #[test]
    fn test_server_requests_without_handler() {
        let router = ResponseRouter::new();

        let ping = router
            .route(Request::new("s1", "ping", None).into())
            .unwrap();
        assert_eq!(ping.id, RequestId::from("s1"));
        assert_eq!(ping.result(), Some(&serde_json::json!({})));

        let unknown = router
            .route(Request::new(5, "sampling/createMessage", None).into())
            .unwrap();
        assert_eq!(unknown.error().map(|e| e.code), Some(-32601));
    }

    #[test]
    fn test_inbound_handler_takes_requests_and_notifications() {
        let router = ResponseRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.set_inbound_handler(Arc::new(move |m: Message| {
            sink.lock().push(m.method().map(str::to_string));
        }));

        assert!(router.route(Request::new(1, "ping", None).into()).is_none());
        assert!(
            router
                .route(Notification::new("notifications/tools/list_changed", None).into())
                .is_none()
        );
        assert_eq!(
            *seen.lock(),
            vec![
                Some("ping".to_string()),
                Some("notifications/tools/list_changed".to_string())
            ]
        );
    }

    #[test]
    fn test_fail_all_closes_waiters() {
        let router = ResponseRouter::new();
        let mut rx = router.wait_for_response(RequestId::from(1));
        assert_eq!(router.fail_all(), 1);
        assert!(rx.try_recv().is_err());
    }
}
