//! [`HttpConnector`] backed by `reqwest`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client as HttpClient, header};
use toolcall_transport_traits::{
    ByteStream, HttpConnector, PostResponse, TlsConfig, TlsVersion, TransportError,
    TransportResult,
};
use tracing::{debug, error, info, warn};

use crate::config::SseClientConfig;

/// Environment variable that must be set before certificate validation can be disabled.
pub const INSECURE_TLS_ENV_VAR: &str = "TOOLCALL_ALLOW_INSECURE_TLS";

/// Streaming GET and POST over a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestConnector {
    http_client: HttpClient,
    request_timeout: Option<Duration>,
}

impl ReqwestConnector {
    /// Build the HTTP client described by `config`.
    ///
    /// No client-wide timeout is set, since that would cut the event stream; POSTs
    /// are bounded by `timeouts.request` instead.
    pub fn new(config: &SseClientConfig) -> TransportResult<Self> {
        // use_rustls_tls() explicitly: features are additive and another crate may enable native-tls
        let mut client_builder = HttpClient::builder()
            .use_rustls_tls()
            .connect_timeout(config.timeouts.connect)
            .default_headers(default_headers(config));

        if let Some(ref user_agent) = config.user_agent {
            client_builder = client_builder.user_agent(user_agent);
        }

        client_builder = apply_tls(client_builder, &config.tls);

        let http_client = client_builder.build().map_err(|e| {
            TransportError::ConfigurationError(format!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            http_client,
            request_timeout: config.timeouts.request,
        })
    }
}

fn default_headers(config: &SseClientConfig) -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();

    if let Some(token) = &config.auth_token
        && let Ok(auth_value) = header::HeaderValue::from_str(&format!("Bearer {}", token))
    {
        headers.insert(header::AUTHORIZATION, auth_value);
    }

    for (key, value) in &config.headers {
        match (
            header::HeaderName::from_bytes(key.as_bytes()),
            header::HeaderValue::from_str(value),
        ) {
            (Ok(k), Ok(v)) => {
                headers.insert(k, v);
            }
            _ => warn!(header = %key, "skipping invalid custom header"),
        }
    }

    headers
}

fn apply_tls(
    mut client_builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> reqwest::ClientBuilder {
    client_builder = match tls.min_version {
        TlsVersion::Tls12 => client_builder.min_tls_version(reqwest::tls::Version::TLS_1_2),
        TlsVersion::Tls13 => client_builder.min_tls_version(reqwest::tls::Version::TLS_1_3),
    };

    if tls.is_insecure() {
        if std::env::var(INSECURE_TLS_ENV_VAR).is_err() {
            error!(
                "Certificate validation disabled but {} not set; keeping validation on. \
                 Set {}=1 to allow insecure TLS.",
                INSECURE_TLS_ENV_VAR, INSECURE_TLS_ENV_VAR
            );
        } else {
            warn!(
                "TLS certificate validation is DISABLED. Only use this against test servers."
            );
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }
    }

    if let Some(ca_certs) = &tls.custom_ca_certs {
        let total = ca_certs.len();
        let mut loaded = 0usize;
        for cert_bytes in ca_certs {
            if let Ok(cert) = reqwest::Certificate::from_pem(cert_bytes) {
                client_builder = client_builder.add_root_certificate(cert);
                loaded += 1;
            } else if let Ok(cert) = reqwest::Certificate::from_der(cert_bytes) {
                client_builder = client_builder.add_root_certificate(cert);
                loaded += 1;
            } else {
                warn!("Failed to parse custom CA certificate, skipping");
            }
        }
        if loaded == 0 && total > 0 {
            error!("All {} custom CA certificates failed to parse", total);
        } else if loaded > 0 {
            info!("Loaded {}/{} custom CA certificates", loaded, total);
        }
    }

    client_builder
}

impl HttpConnector for ReqwestConnector {
    fn open_stream<'a>(
        &'a self,
        uri: &'a str,
        last_event_id: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = TransportResult<ByteStream>> + Send + 'a>> {
        Box::pin(async move {
            let mut request = self
                .http_client
                .get(uri)
                .header(header::ACCEPT, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache");
            if let Some(id) = last_event_id
                && let Ok(value) = header::HeaderValue::from_str(id)
            {
                request = request.header("Last-Event-ID", value);
            }

            let response = request
                .send()
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::ConnectionFailed(format!(
                    "event stream request to {} returned {}",
                    uri, status
                )));
            }
            debug!(%uri, %status, "event stream opened");

            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError::ConnectionLost(e.to_string())));
            Ok(Box::pin(stream) as ByteStream)
        })
    }

    fn post<'a>(
        &'a self,
        uri: &'a str,
        body: Bytes,
    ) -> Pin<Box<dyn Future<Output = TransportResult<PostResponse>> + Send + 'a>> {
        Box::pin(async move {
            let mut request = self
                .http_client
                .post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .body(body);
            if let Some(timeout) = self.request_timeout {
                request = request.timeout(timeout);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::RequestTimeout {
                        operation: format!("POST {}", uri),
                        timeout: self.request_timeout.unwrap_or_default(),
                    }
                } else {
                    TransportError::ConnectionFailed(e.to_string())
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
            Ok(PostResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector() -> ReqwestConnector {
        ReqwestConnector::new(&SseClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_post_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header_eq("content-type", "application/json"))
            .and(body_json(serde_json::json!({"jsonrpc": "2.0", "method": "ping"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let uri = format!("{}/messages", server.uri());
        let response = connector()
            .post(&uri, Bytes::from_static(br#"{"jsonrpc":"2.0","method":"ping"}"#))
            .await
            .unwrap();

        assert_eq!(response.status, 202);
        assert!(response.is_success());
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_post_error_status_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let response = connector()
            .post(&server.uri(), Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(&response.body[..], b"boom");
    }

    #[tokio::test]
    async fn test_open_stream_sends_last_event_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sse"))
            .and(header_eq("accept", "text/event-stream"))
            .and(header_eq("last-event-id", "42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("event: endpoint\ndata: /messages\n\n", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uri = format!("{}/sse", server.uri());
        let connector = connector();
        let stream = connector.open_stream(&uri, Some("42")).await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        let body: Vec<u8> = chunks.concat();
        assert_eq!(body, b"event: endpoint\ndata: /messages\n\n");
    }

    #[tokio::test]
    async fn test_open_stream_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let connector = connector();
        let err = match connector.open_stream(&server.uri(), None).await {
            Err(e) => e,
            Ok(_) => panic!("404 must not open a stream"),
        };
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }

    #[tokio::test]
    async fn test_auth_token_and_custom_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_eq("authorization", "Bearer secret"))
            .and(header_eq("x-tenant", "acme"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = SseClientConfig::default();
        config.auth_token = Some("secret".to_string());
        config.headers.insert("X-Tenant".to_string(), "acme".to_string());
        let connector = ReqwestConnector::new(&config).unwrap();

        let response = connector
            .post(&server.uri(), Bytes::from_static(b"{}"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_failed() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = connector();
        let err = connector
            .post(&format!("http://127.0.0.1:{port}/messages"), Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
