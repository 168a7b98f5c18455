//! SSE client configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use toolcall_transport_traits::{LimitsConfig, TimeoutConfig, TlsConfig};

use crate::retry::RetryPolicy;

/// Configuration of an [`SseTransport`](crate::SseTransport).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SseClientConfig {
    /// URL of the event stream (e.g., <http://localhost:8080/sse>).
    ///
    /// Relative `endpoint` announcements are resolved against it.
    pub url: String,

    /// Connect, POST and stream idle timeouts
    pub timeouts: TimeoutConfig,

    /// Auto-reconnect policy
    pub retry_policy: RetryPolicy,

    /// Bearer token sent on every request
    pub auth_token: Option<String>,

    /// Custom headers
    pub headers: HashMap<String, String>,

    /// User agent string (set to None to disable User-Agent header)
    ///
    /// Default: `toolcall/{version}`
    pub user_agent: Option<String>,

    /// Size limits for POST bodies and stream lines
    pub limits: LimitsConfig,

    /// TLS/HTTPS configuration
    pub tls: TlsConfig,
}

impl Default for SseClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/sse".to_string(),
            timeouts: TimeoutConfig::default(),
            retry_policy: RetryPolicy::default(),
            auth_token: None,
            headers: HashMap::new(),
            user_agent: Some(format!("toolcall/{}", env!("CARGO_PKG_VERSION"))),
            limits: LimitsConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl SseClientConfig {
    /// Default configuration for the stream at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
