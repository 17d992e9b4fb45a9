//! Forwarding of intercepted calls to the managed proxy.

use async_trait::async_trait;
use domain::{Configuration, Operation, OrgId, ProxyError, RequestId};
use serde_json::Value;
use tracing::debug;

/// Header carrying the control-plane credential.
pub const API_KEY_HEADER: &str = "X-Skew-API-Key";
/// Header carrying the interceptor's request identifier.
pub const REQUEST_ID_HEADER: &str = "X-Skew-Request-ID";
/// Header carrying the organisation; empty when none is configured.
pub const ORG_ID_HEADER: &str = "X-Skew-Org-ID";
/// Header carrying the project, when configured.
pub const PROJECT_ID_HEADER: &str = "X-Skew-Project-ID";
/// Header carrying the model-provider credential, when configured.
pub const PROVIDER_KEY_HEADER: &str = "X-Skew-Original-API-Key";

const MAX_ERROR_BODY: usize = 512;

/// Returns `{base_url}/{operation path}`, tolerating a trailing slash.
pub fn proxy_url(base_url: &str, operation: Operation) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        operation.proxy_path()
    )
}

/// Sends one request body to the proxy and returns the decoded JSON answer.
///
/// Abstracted as a trait so the interceptor can be tested without a network.
#[async_trait]
pub trait ProxyTransport: Send + Sync + 'static {
    /// Forwards `body` for `operation`.
    async fn forward(
        &self,
        operation: Operation,
        request_id: &RequestId,
        body: Value,
        config: &Configuration,
    ) -> Result<Value, ProxyError>;
}

/// [`ProxyTransport`] over reqwest.
///
/// One connection pool is shared across calls; the per-request timeout comes
/// from the snapshot passed to [`ProxyTransport::forward`].
#[derive(Debug, Clone)]
pub struct HttpProxyTransport {
    client: reqwest::Client,
}

impl HttpProxyTransport {
    /// Creates a transport with its own connection pool.
    pub fn new() -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProxyError::Unavailable {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
                timed_out: false,
            })?;
        Ok(Self { client })
    }

    /// Creates a transport over an existing connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProxyTransport for HttpProxyTransport {
    async fn forward(
        &self,
        operation: Operation,
        request_id: &RequestId,
        body: Value,
        config: &Configuration,
    ) -> Result<Value, ProxyError> {
        let url = proxy_url(&config.proxy.base_url, operation);

        let mut request = self
            .client
            .post(&url)
            .timeout(config.proxy.timeout)
            .header(API_KEY_HEADER, config.api_key.expose())
            .header(REQUEST_ID_HEADER, request_id.as_str())
            .header(
                ORG_ID_HEADER,
                config.org_id.as_ref().map(OrgId::as_str).unwrap_or_default(),
            )
            .json(&body);
        if let Some(project) = &config.project_id {
            request = request.header(PROJECT_ID_HEADER, project.as_str());
        }
        if let Some(provider_key) = &config.proxy.provider_api_key {
            request = request.header(PROVIDER_KEY_HEADER, provider_key.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_error(&url, &e))?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), request_id = %request_id, "proxy responded");

        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProxyError::Rejected {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.to_string()
                } else {
                    truncate(&message, MAX_ERROR_BODY).to_string()
                },
            });
        }
        if !status.is_success() {
            return Err(ProxyError::Unavailable {
                url,
                reason: format!("HTTP {status}"),
                timed_out: false,
            });
        }

        response.json::<Value>().await.map_err(|e| ProxyError::Unavailable {
            url,
            reason: format!("undecodable response body: {e}"),
            timed_out: e.is_timeout(),
        })
    }
}

fn classify_error(url: &str, err: &reqwest::Error) -> ProxyError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    ProxyError::Unavailable {
        url: url.to_string(),
        reason,
        timed_out: err.is_timeout(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
