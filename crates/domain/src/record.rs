//! Telemetry record for one completed (or abandoned) call.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    OrgId, Operation, ProjectId, RequestId, RouteReason, RoutedVia, TokenCost, TokenUsage,
    Timestamp,
};

/// Model label used when neither the request nor the response names one.
pub const UNKNOWN_MODEL: &str = "unknown";

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// The call returned a response.
    Success,
    /// The call returned an error.
    Error,
    /// The call returned an error classified as a timeout.
    Timeout,
    /// The caller dropped the call future before it completed.
    Cancelled,
}

/// One call as reported to the control plane.
///
/// Built by the interceptor once the call settles, then moved into the
/// buffer; nothing mutates it afterwards. Prompt text is present only when
/// the snapshot enables prompt inclusion; otherwise at most a digest is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// Identifier of the call.
    pub request_id: RequestId,
    /// Call site.
    pub operation: Operation,
    /// Model requested (or reported, when the request did not name one).
    pub model: String,
    /// Model reported by the response when it differs from `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_model: Option<String>,
    /// Organisation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    /// Project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// When the interceptor received the call.
    pub start_time: Timestamp,
    /// When the call settled.
    pub end_time: Timestamp,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// Token usage (zero when unavailable).
    pub token_usage: TokenUsage,
    /// Estimated cost in USD.
    pub cost_estimate_usd: TokenCost,
    /// How the call ended.
    pub outcome: CallOutcome,
    /// Error class, for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Error message, for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Which path served the call.
    pub routed_via: RoutedVia,
    /// Why that path was taken.
    pub route_reason: RouteReason,
    /// Result of the sampling draw. Always `true` for a delivered record;
    /// kept so the control plane can scale counts by the sample rate.
    pub sampling_decision: bool,
    /// Sample rate in force for this call.
    pub sample_rate: f64,
    /// Requested completion token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Requested temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Digest of the prompt, when prompts are excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    /// Raw prompt, only when prompts are included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Returns the first 16 hex characters of the SHA-256 of `prompt`.
///
/// Lets the control plane group identical prompts without storing them.
pub fn hash_prompt(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
