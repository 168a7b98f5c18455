//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum TLS protocol version accepted by HTTP transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    #[default]
    Tls13,
}

/// TLS/HTTPS configuration for secure transport connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Minimum TLS protocol version to accept.
    pub min_version: TlsVersion,

    /// Whether to validate server certificates.
    pub validate_certificates: bool,

    /// Custom CA certificates to trust (PEM).
    pub custom_ca_certs: Option<Vec<Vec<u8>>>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::default(),
            validate_certificates: true,
            custom_ca_certs: None,
        }
    }
}

impl TlsConfig {
    /// Accept TLS 1.2 servers as well (many local MCP servers still sit behind one).
    #[must_use]
    pub const fn compatible() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            validate_certificates: true,
            custom_ca_certs: None,
        }
    }

    /// Create an insecure TLS configuration that skips certificate validation.
    ///
    /// **Warning**: This configuration is insecure and should ONLY be used in testing.
    #[must_use]
    pub const fn insecure() -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            validate_certificates: false,
            custom_ca_certs: None,
        }
    }

    /// Check if this configuration is insecure (skips certificate validation).
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        !self.validate_certificates
    }
}

/// Configuration for request and response size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of one inbound message (an SSE line or a stdio line) in bytes.
    /// `None` = unlimited
    pub max_response_size: Option<usize>,

    /// Maximum request body size in bytes.
    /// `None` = unlimited
    pub max_request_size: Option<usize>,

    /// Whether to enforce `max_response_size` on streaming connections.
    pub enforce_on_streams: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_response_size: Some(10 * 1024 * 1024), // 10MB
            max_request_size: Some(1024 * 1024),       // 1MB
            enforce_on_streams: true,
        }
    }
}

impl LimitsConfig {
    /// Create a configuration with no limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_response_size: None,
            max_request_size: None,
            enforce_on_streams: false,
        }
    }

    /// Line limit for stream parsers, `None` when streams are not checked.
    pub fn stream_line_limit(&self) -> Option<usize> {
        if self.enforce_on_streams {
            self.max_response_size
        } else {
            None
        }
    }
}

/// Configuration for request and operation timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout (opening the event stream, spawning a child).
    pub connect: Duration,

    /// Single request timeout: one POST, or one request/response round trip in the client.
    /// `None` = no timeout
    pub request: Option<Duration>,

    /// Idle timeout on the event stream; a stream silent for longer is reconnected.
    /// `None` = no timeout
    pub read: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Some(Duration::from_secs(60)),
            read: None,
        }
    }
}

impl TimeoutConfig {
    /// Create a configuration with short timeouts for fast operations.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Some(Duration::from_secs(10)),
            read: Some(Duration::from_secs(30)),
        }
    }

    /// Create a configuration with no timeouts.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: None,
            read: None,
        }
    }

    /// Create a configuration with long timeouts for slow tools.
    #[must_use]
    pub const fn patient() -> Self {
        Self {
            connect: Duration::from_secs(60),
            request: Some(Duration::from_secs(300)), // 5 minutes
            read: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_config_default() {
        let config = TlsConfig::default();
        assert!(config.validate_certificates);
        assert!(!config.is_insecure());
        assert_eq!(config.min_version, TlsVersion::Tls13);
        assert!(TlsConfig::insecure().is_insecure());
    }

    #[test]
    fn test_limits_config_default() {
        let config = LimitsConfig::default();
        assert_eq!(config.max_response_size, Some(10 * 1024 * 1024));
        assert_eq!(config.max_request_size, Some(1024 * 1024));
        assert_eq!(config.stream_line_limit(), Some(10 * 1024 * 1024));
        assert_eq!(LimitsConfig::unlimited().stream_line_limit(), None);
    }

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.connect, Duration::from_secs(30));
        assert_eq!(config.request, Some(Duration::from_secs(60)));
        assert_eq!(config.read, None);
    }

    #[test]
    fn test_timeout_presets() {
        assert!(TimeoutConfig::fast().request < TimeoutConfig::default().request);
        assert!(TimeoutConfig::patient().request > TimeoutConfig::default().request);
        assert_eq!(TimeoutConfig::unlimited().request, None);
        assert_eq!(TlsConfig::compatible().min_version, TlsVersion::Tls12);
        assert!(!TlsConfig::compatible().is_insecure());
    }

    #[test]
    fn test_config_deserializes() {
        let limits: LimitsConfig = serde_json::from_str(
            r#"{"max_response_size":null,"max_request_size":1024,"enforce_on_streams":false}"#,
        )
        .unwrap();
        assert_eq!(limits.max_request_size, Some(1024));
        assert_eq!(limits.stream_line_limit(), None);
    }
}
