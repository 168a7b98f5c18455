//! JSON-RPC 2.0 envelopes.
//!
//! Every envelope encodes to a JSON object carrying `"jsonrpc": "2.0"`. Decoding is
//! shape-driven (see [`Message::decode`]) and rejects anything that violates the
//! request/response/notification invariants with [`ProtocolError::MalformedMessage`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::methods;
use crate::types::InitializeParams;

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier - can be string or number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

impl RequestId {
    fn from_json(value: Value) -> ProtocolResult<Self> {
        match value {
            Value::String(s) => Ok(Self::String(s)),
            Value::Number(n) => n.as_i64().map(Self::Number).ok_or_else(|| {
                ProtocolError::malformed(format!("`id` must be an integer, got {}", n))
            }),
            Value::Null => Err(ProtocolError::malformed("`id` must not be null")),
            other => Err(ProtocolError::malformed(format!(
                "`id` must be a string or number, got {}",
                other
            ))),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Number(n) => Value::from(*n),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for RequestId {
    fn from(n: i32) -> Self {
        Self::Number(i64::from(n))
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with additional data
    #[must_use]
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a parse error (-32700)
    #[must_use]
    pub fn parse_error() -> Self {
        JsonRpcErrorCode::ParseError.into()
    }

    /// Create an invalid request error (-32600)
    #[must_use]
    pub fn invalid_request() -> Self {
        JsonRpcErrorCode::InvalidRequest.into()
    }

    /// Create a method not found error (-32601)
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {}", method))
    }

    /// Create an invalid params error (-32602)
    #[must_use]
    pub fn invalid_params(details: &str) -> Self {
        Self::new(-32602, format!("Invalid params: {}", details))
    }

    /// Create an internal error (-32603)
    #[must_use]
    pub fn internal_error(details: &str) -> Self {
        Self::new(-32603, format!("Internal error: {}", details))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Parse error (-32700)
    ParseError,
    /// Invalid request (-32600)
    InvalidRequest,
    /// Method not found (-32601)
    MethodNotFound,
    /// Invalid params (-32602)
    InvalidParams,
    /// Internal error (-32603)
    InternalError,
    /// Application-defined error
    ApplicationError(i32),
}

impl JsonRpcErrorCode {
    /// Get the numeric code
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ApplicationError(code) => *code,
        }
    }

    /// Get the standard message
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ApplicationError(_) => "Application error",
        }
    }
}

impl From<i32> for JsonRpcErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            other => Self::ApplicationError(other),
        }
    }
}

impl From<JsonRpcErrorCode> for JsonRpcError {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self::new(code.code(), code.message())
    }
}

/// JSON-RPC request message
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request identifier, unique among outstanding calls
    pub id: RequestId,
    /// Request method name
    pub method: String,
    /// Request parameters
    pub params: Option<Value>,
}

impl Request {
    /// Create a new JSON-RPC request
    #[must_use]
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Build the `initialize` request that opens the handshake.
    pub fn initialize(id: impl Into<RequestId>, params: &InitializeParams) -> ProtocolResult<Self> {
        Ok(Self::new(
            id,
            methods::INITIALIZE,
            Some(serde_json::to_value(params)?),
        ))
    }

    /// Canonical JSON encoding.
    pub fn to_json(&self) -> Value {
        let mut object = envelope();
        object.insert("id".into(), self.id.to_json());
        object.insert("method".into(), Value::String(self.method.clone()));
        if let Some(params) = &self.params {
            object.insert("params".into(), params.clone());
        }
        Value::Object(object)
    }

    /// Decode a request, rejecting notifications and responses.
    pub fn from_json(value: Value) -> ProtocolResult<Self> {
        let mut object = into_envelope(value)?;
        reject_response_keys(&object, "request")?;
        let method = take_method(&mut object)?;
        let id = object
            .remove("id")
            .ok_or_else(|| ProtocolError::malformed("request is missing `id`"))?;
        Ok(Self {
            id: RequestId::from_json(id)?,
            method,
            params: object.remove("params"),
        })
    }
}

/// JSON-RPC notification (no response expected)
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Notification method name
    pub method: String,
    /// Notification parameters
    pub params: Option<Value>,
}

impl Notification {
    /// Create a new notification
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// The parameterless `initialized` notification that closes the handshake.
    #[must_use]
    pub fn initialized() -> Self {
        Self::new(methods::INITIALIZED, None)
    }

    /// Canonical JSON encoding.
    pub fn to_json(&self) -> Value {
        let mut object = envelope();
        object.insert("method".into(), Value::String(self.method.clone()));
        if let Some(params) = &self.params {
            object.insert("params".into(), params.clone());
        }
        Value::Object(object)
    }

    /// Decode a notification, rejecting anything that carries an `id`.
    pub fn from_json(value: Value) -> ProtocolResult<Self> {
        let mut object = into_envelope(value)?;
        reject_response_keys(&object, "notification")?;
        if object.contains_key("id") {
            return Err(ProtocolError::malformed("notification must not carry an `id`"));
        }
        let method = take_method(&mut object)?;
        Ok(Self {
            method,
            params: object.remove("params"),
        })
    }
}

/// Outcome carried by a [`Response`]; `result` and `error` are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Successful response
    Result(Value),
    /// Error response
    Error(JsonRpcError),
}

/// JSON-RPC response message
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the request this answers
    pub id: RequestId,
    /// Response payload
    pub payload: ResponsePayload,
}

impl Response {
    /// Create a success response
    #[must_use]
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            id: id.into(),
            payload: ResponsePayload::Result(result),
        }
    }

    /// Create an error response
    #[must_use]
    pub fn error_response(id: impl Into<RequestId>, error: JsonRpcError) -> Self {
        Self {
            id: id.into(),
            payload: ResponsePayload::Error(error),
        }
    }

    /// Check if this is a success response
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.payload, ResponsePayload::Result(_))
    }

    /// Get the result if success
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(result) => Some(result),
            ResponsePayload::Error(_) => None,
        }
    }

    /// Get the error if error
    #[must_use]
    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(error) => Some(error),
        }
    }

    /// Split into `Ok(result)` or `Err(error)`.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.payload {
            ResponsePayload::Result(result) => Ok(result),
            ResponsePayload::Error(error) => Err(error),
        }
    }

    /// Canonical JSON encoding.
    pub fn to_json(&self) -> Value {
        let mut object = envelope();
        object.insert("id".into(), self.id.to_json());
        match &self.payload {
            ResponsePayload::Result(result) => {
                object.insert("result".into(), result.clone());
            }
            ResponsePayload::Error(error) => {
                let mut error_object = Map::new();
                error_object.insert("code".into(), Value::from(error.code));
                error_object.insert("message".into(), Value::String(error.message.clone()));
                if let Some(data) = &error.data {
                    error_object.insert("data".into(), data.clone());
                }
                object.insert("error".into(), Value::Object(error_object));
            }
        }
        Value::Object(object)
    }

    /// Decode a response. Exactly one of `result` / `error` must be present, along with `id`.
    pub fn from_json(value: Value) -> ProtocolResult<Self> {
        let mut object = into_envelope(value)?;
        if object.contains_key("method") {
            return Err(ProtocolError::malformed("response must not carry `method`"));
        }
        let id = object
            .remove("id")
            .ok_or_else(|| ProtocolError::malformed("response is missing `id`"))?;
        let id = RequestId::from_json(id)?;

        let payload = match (object.remove("result"), object.remove("error")) {
            (Some(_), Some(_)) => {
                return Err(ProtocolError::malformed(
                    "response carries both `result` and `error`",
                ));
            }
            (None, None) => {
                return Err(ProtocolError::malformed(
                    "response carries neither `result` nor `error`",
                ));
            }
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => {
                let error: JsonRpcError = serde_json::from_value(error).map_err(|e| {
                    ProtocolError::malformed(format!("invalid `error` object: {}", e))
                })?;
                ResponsePayload::Error(error)
            }
        };

        Ok(Self { id, payload })
    }
}

/// Discriminator for the three envelope variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Carries `method` and `id`
    Request,
    /// Carries `id` and one of `result` / `error`
    Response,
    /// Carries `method` but no `id`
    Notification,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
            Self::Notification => write!(f, "notification"),
        }
    }
}

/// Any JSON-RPC envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a response
    Request(Request),
    /// The answer to an earlier request
    Response(Response),
    /// A fire-and-forget call
    Notification(Notification),
}

impl Message {
    /// Decode an envelope by inspecting its shape.
    ///
    /// `method` with `id` is a request, `method` alone is a notification, and
    /// `result`/`error` without `method` is a response. Anything else, or a shape
    /// that mixes them, is [`ProtocolError::MalformedMessage`].
    pub fn decode(value: Value) -> ProtocolResult<Self> {
        let Value::Object(object) = &value else {
            return Err(ProtocolError::malformed("envelope is not a JSON object"));
        };

        let has_method = object.contains_key("method");
        let has_outcome = object.contains_key("result") || object.contains_key("error");
        let has_id = object.contains_key("id");

        match (has_method, has_outcome) {
            (true, true) => Err(ProtocolError::malformed(
                "envelope carries both `method` and `result`/`error`",
            )),
            (true, false) if has_id => Request::from_json(value).map(Self::Request),
            (true, false) => Notification::from_json(value).map(Self::Notification),
            (false, true) => Response::from_json(value).map(Self::Response),
            (false, false) => Err(ProtocolError::malformed(
                "envelope carries neither `method` nor `result`/`error`",
            )),
        }
    }

    /// Decode from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::malformed(format!("invalid JSON: {}", e)))?;
        Self::decode(value)
    }

    /// Canonical JSON encoding.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Request(request) => request.to_json(),
            Self::Response(response) => response.to_json(),
            Self::Notification(notification) => notification.to_json(),
        }
    }

    /// Canonical JSON encoding as bytes, ready for a POST body or a stdio line.
    pub fn to_vec(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_json())?)
    }

    /// Which variant this is.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request(_) => MessageKind::Request,
            Self::Response(_) => MessageKind::Response,
            Self::Notification(_) => MessageKind::Notification,
        }
    }

    /// Correlation identifier; always `Some` for requests and responses.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(request) => Some(&request.id),
            Self::Response(response) => Some(&response.id),
            Self::Notification(_) => None,
        }
    }

    /// Method name, absent on responses.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(request) => Some(&request.method),
            Self::Response(_) => None,
            Self::Notification(notification) => Some(&notification.method),
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(s.as_bytes())
    }
}

impl Serialize for Message {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::decode(value).map_err(serde::de::Error::custom)
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

fn envelope() -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("jsonrpc".into(), Value::String(JSONRPC_VERSION.into()));
    object
}

fn into_envelope(value: Value) -> ProtocolResult<Map<String, Value>> {
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::malformed("envelope is not a JSON object"));
    };
    match object.remove("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => Ok(object),
        Some(other) => Err(ProtocolError::malformed(format!(
            "unsupported `jsonrpc` version: {}",
            other
        ))),
        None => Err(ProtocolError::malformed("missing `jsonrpc` version tag")),
    }
}

fn reject_response_keys(object: &Map<String, Value>, kind: &str) -> ProtocolResult<()> {
    if object.contains_key("result") || object.contains_key("error") {
        return Err(ProtocolError::malformed(format!(
            "{} must not carry `result` or `error`",
            kind
        )));
    }
    Ok(())
}

fn take_method(object: &mut Map<String, Value>) -> ProtocolResult<String> {
    match object.remove("method") {
        Some(Value::String(method)) => Ok(method),
        Some(other) => Err(ProtocolError::malformed(format!(
            "`method` must be a string, got {}",
            other
        ))),
        None => Err(ProtocolError::malformed("missing `method`")),
    }
}
