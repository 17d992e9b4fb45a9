//! Control-plane event shape.
//!
//! The ingestion endpoint expects each event split into `request`,
//! `response` and `context` objects. [`CallRecord`] stays flat for the rest of
//! the crate; these borrowed views exist only for serialisation.
//!
//! ```text
//! { "request":  { requestId, orgId, projectId, endpoint, model, maxTokens, temperature, timestampStart },
//!   "response": { timestampEnd, tokenUsage, costEstimateUsd, latencyMs, errorClass, errorMessage, outcome, responseModel },
//!   "context":  { sdkLanguage, sdkVersion, promptHash, prompt, operation, routedVia, routeReason, samplingDecision, sampleRate } }
//! ```
//!
//! Absent optionals are sent as `null`.

use domain::{
    CallOutcome, CallRecord, OrgId, Operation, ProjectId, RequestId, RouteReason, RoutedVia,
    Timestamp, TokenCost, TokenUsage,
};
use serde::Serialize;

use crate::sink::{SDK_LANGUAGE, SDK_VERSION};

/// Body posted to the telemetry endpoint.
#[derive(Serialize)]
pub(crate) struct Envelope<'a> {
    events: Vec<WireEvent<'a>>,
}

impl<'a> Envelope<'a> {
    pub(crate) fn new(batch: &'a [CallRecord]) -> Self {
        Self {
            events: batch.iter().map(WireEvent::from).collect(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct WireEvent<'a> {
    request: RequestPart<'a>,
    response: ResponsePart<'a>,
    context: ContextPart<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart<'a> {
    request_id: &'a RequestId,
    org_id: Option<&'a OrgId>,
    project_id: Option<&'a ProjectId>,
    endpoint: &'static str,
    model: &'a str,
    max_tokens: Option<u64>,
    temperature: Option<f64>,
    timestamp_start: Timestamp,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart<'a> {
    timestamp_end: Timestamp,
    token_usage: TokenUsage,
    cost_estimate_usd: TokenCost,
    latency_ms: u64,
    error_class: Option<&'a str>,
    error_message: Option<&'a str>,
    outcome: CallOutcome,
    response_model: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextPart<'a> {
    sdk_language: &'static str,
    sdk_version: &'static str,
    prompt_hash: Option<&'a str>,
    prompt: Option<&'a str>,
    operation: Operation,
    routed_via: RoutedVia,
    route_reason: RouteReason,
    sampling_decision: bool,
    sample_rate: f64,
}

impl<'a> From<&'a CallRecord> for WireEvent<'a> {
    fn from(r: &'a CallRecord) -> Self {
        Self {
            request: RequestPart {
                request_id: &r.request_id,
                org_id: r.org_id.as_ref(),
                project_id: r.project_id.as_ref(),
                endpoint: r.operation.endpoint(),
                model: &r.model,
                max_tokens: r.max_tokens,
                temperature: r.temperature,
                timestamp_start: r.start_time,
            },
            response: ResponsePart {
                timestamp_end: r.end_time,
                token_usage: r.token_usage,
                cost_estimate_usd: r.cost_estimate_usd,
                latency_ms: r.latency_ms,
                error_class: r.error_kind.as_deref(),
                error_message: r.error_message.as_deref(),
                outcome: r.outcome,
                response_model: r.response_model.as_deref(),
            },
            context: ContextPart {
                sdk_language: SDK_LANGUAGE,
                sdk_version: SDK_VERSION,
                prompt_hash: r.prompt_hash.as_deref(),
                prompt: r.prompt.as_deref(),
                operation: r.operation,
                routed_via: r.routed_via,
                route_reason: r.route_reason,
                sampling_decision: r.sampling_decision,
                sample_rate: r.sample_rate,
            },
        }
    }
}
