//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use toolcall_protocol::{CapabilitySet, Implementation, LATEST_PROTOCOL_VERSION};
use toolcall_transport_traits::TimeoutConfig;

/// Default bound on waiting for the transport to become ready.
pub const DEFAULT_ENDPOINT_WAIT: Duration = Duration::from_secs(10);

/// Configuration of a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identity sent in `initialize`
    pub client_info: Implementation,

    /// Protocol revision requested in `initialize`
    pub protocol_version: String,

    /// Capabilities advertised in `initialize`
    pub capabilities: CapabilitySet,

    /// `request` bounds how long a call waits for its response
    pub timeouts: TimeoutConfig,

    /// How long `initialize` waits for the transport to become ready
    /// (for SSE, the first endpoint announcement)
    pub endpoint_wait: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("toolcall", env!("CARGO_PKG_VERSION")),
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: CapabilitySet::new(),
            timeouts: TimeoutConfig::default(),
            endpoint_wait: DEFAULT_ENDPOINT_WAIT,
        }
    }
}

impl ClientConfig {
    /// Default configuration announcing `name`/`version` as the client identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_info: Implementation::new(name, version),
            ..Self::default()
        }
    }

    /// Set the per-request timeout (`None` waits forever).
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeouts.request = timeout;
        self
    }
}
