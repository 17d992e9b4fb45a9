//! Batch delivery to the control plane.
//!
//! [`TelemetrySink`] is the seam the dispatcher delivers through; the
//! production implementation is [`HttpTelemetrySink`]. Tests substitute an
//! in-memory sink.

use std::time::Duration;

use async_trait::async_trait;
use domain::{CallRecord, Configuration, TelemetryError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::debug;

use crate::wire::Envelope;

/// Value of the `X-Skew-SDK-Language` header.
pub const SDK_LANGUAGE: &str = "rust";

/// Value of the `X-Skew-SDK-Version` header.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for record batches.
///
/// `config` is the snapshot current when the attempt starts, so endpoint and
/// credential changes take effect on the next attempt after a refresh.
#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
    /// Delivers one batch. The dispatcher decides whether to retry from the
    /// error's [`TelemetryError::retry_policy`].
    async fn deliver(
        &self,
        batch: &[CallRecord],
        config: &Configuration,
    ) -> Result<(), TelemetryError>;
}

/// Posts batches as `{"events": [...]}` to the configured telemetry endpoint,
/// each event nested into `request`, `response` and `context` objects.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
    client: reqwest::Client,
}

impl HttpTelemetrySink {
    /// Creates a sink with its own connection pool.
    pub fn new() -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TelemetryError::Delivery {
                status: None,
                reason: format!("failed to build HTTP client: {e}"),
                retry_after: None,
            })?;
        Ok(Self { client })
    }

    /// Creates a sink over an existing connection pool. Each request still
    /// carries its own timeout.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn deliver(
        &self,
        batch: &[CallRecord],
        config: &Configuration,
    ) -> Result<(), TelemetryError> {
        let body = serde_json::to_vec(&Envelope::new(batch))
            .map_err(|e| TelemetryError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(&config.telemetry.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(config.api_key.expose())
            .header("X-Skew-SDK-Language", SDK_LANGUAGE)
            .header("X-Skew-SDK-Version", SDK_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TelemetryError::Delivery {
                status: None,
                reason: e.to_string(),
                retry_after: None,
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(events = batch.len(), status = status.as_u16(), "telemetry batch accepted");
            return Ok(());
        }

        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        Err(TelemetryError::Delivery {
            status: Some(status.as_u16()),
            reason: if text.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {}", truncate(&text, 200))
            },
            retry_after,
        })
    }
}

/// Reads a delta-seconds `Retry-After`. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use domain::{ApiKey, RetryPolicy};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> Configuration {
        let mut config = Configuration::with_defaults(ApiKey::new("sk_test").unwrap());
        config.telemetry.endpoint = format!("{}/v1/telemetry", server.uri());
        config
    }

    #[tokio::test]
    async fn posts_events_envelope_with_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/telemetry"))
            .and(header("authorization", "Bearer sk_test"))
            .and(header("x-skew-sdk-language", "rust"))
            .and(body_partial_json(serde_json::json!({
                "events": [{
                    "request": { "model": "gpt-4o", "endpoint": "chat.completions" },
                    "response": { "outcome": "success" },
                    "context": { "sdkLanguage": "rust" }
                }]
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpTelemetrySink::new().unwrap();
        sink.deliver(&[record("gpt-4o")], &config_for(&server))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_retryable_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let sink = HttpTelemetrySink::new().unwrap();
        let err = sink
            .deliver(&[record("m")], &config_for(&server))
            .await
            .unwrap_err();

        assert_eq!(
            err.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(2))
            }
        );
    }

    #[tokio::test]
    async fn client_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let sink = HttpTelemetrySink::new().unwrap();
        let err = sink
            .deliver(&[record("m")], &config_for(&server))
            .await
            .unwrap_err();

        match &err {
            TelemetryError::Delivery { status, reason, .. } => {
                assert_eq!(*status, Some(401));
                assert!(reason.contains("bad key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.retry_policy().is_retryable());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable() {
        let mut config = Configuration::with_defaults(ApiKey::new("k").unwrap());
        config.telemetry.endpoint = "http://127.0.0.1:1/v1/telemetry".into();

        let sink = HttpTelemetrySink::new().unwrap();
        let err = sink.deliver(&[record("m")], &config).await.unwrap_err();

        assert!(matches!(err, TelemetryError::Delivery { status: None, .. }));
        assert!(err.retry_policy().is_retryable());
    }

    #[test]
    fn retry_after_ignores_http_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }
}
