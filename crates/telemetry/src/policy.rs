//! Control-plane policy fetch.
//!
//! The control plane can override a subset of the local settings (see
//! [`PolicyFlags`]). Fetch failures are reported to the caller, which logs
//! them and keeps the current snapshot.

use std::time::Duration;

use async_trait::async_trait;
use domain::{Configuration, PolicyFlags};
use thiserror::Error;
use tracing::debug;

use crate::sink::{SDK_LANGUAGE, SDK_VERSION};

const POLICY_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a policy could not be obtained.
#[derive(Debug, Error)]
pub enum PolicyFetchError {
    /// The endpoint could not be reached.
    #[error("policy endpoint unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("policy endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The body was not a valid policy document.
    #[error("policy document malformed: {0}")]
    Decode(String),
}

/// Source of control-plane policy overrides.
#[async_trait]
pub trait PolicySource: Send + Sync + 'static {
    /// Fetches the policy for the organisation and project in `config`.
    async fn fetch(&self, config: &Configuration) -> Result<PolicyFlags, PolicyFetchError>;
}

/// Fetches policy with `GET {policy_endpoint}`.
///
/// Organisation and project, when configured, are sent as `orgId` and
/// `projectId` query parameters.
#[derive(Debug, Clone)]
pub struct HttpPolicyClient {
    client: reqwest::Client,
}

impl HttpPolicyClient {
    /// Creates a client with its own connection pool.
    pub fn new() -> Result<Self, PolicyFetchError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PolicyFetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a client over an existing connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PolicySource for HttpPolicyClient {
    async fn fetch(&self, config: &Configuration) -> Result<PolicyFlags, PolicyFetchError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(org) = &config.org_id {
            query.push(("orgId", org.as_str()));
        }
        if let Some(project) = &config.project_id {
            query.push(("projectId", project.as_str()));
        }

        let response = self
            .client
            .get(&config.policy_endpoint)
            .timeout(POLICY_TIMEOUT)
            .query(&query)
            .bearer_auth(config.api_key.expose())
            .header("X-Skew-SDK-Language", SDK_LANGUAGE)
            .header("X-Skew-SDK-Version", SDK_VERSION)
            .send()
            .await
            .map_err(|e| PolicyFetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PolicyFetchError::Status {
                status: status.as_u16(),
            });
        }

        let flags: PolicyFlags = response
            .json()
            .await
            .map_err(|e| PolicyFetchError::Decode(e.to_string()))?;
        debug!(?flags, "policy fetched");
        Ok(flags)
    }
}
