//! Per-call telemetry tracking.
//!
//! A [`CallTracker`] is created when a call starts and consumed when it
//! settles. If the caller drops the call future first, the tracker's `Drop`
//! records a [`CallOutcome::Cancelled`] instead. Every read of the caller's
//! request, response or error goes through [`contained`], so a misbehaving
//! metadata accessor costs a record, never the call.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use domain::{
    estimate_cost, hash_prompt, pricing_for_model, CallOutcome, CallRecord, Configuration,
    ErrorMetadata, Operation, OrgId, ProjectId, ProxyDecision, RequestId, RequestMetadata,
    ResponseMetadata, RouteReason, RoutedVia, Timestamp, TokenUsage, UNKNOWN_MODEL,
};
use rand::Rng;
use tracing::debug;

use crate::engine::Engine;

const MAX_ERROR_MESSAGE: usize = 500;

/// Runs `f`, turning a panic into `None`.
pub(crate) fn contained<T>(what: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(step = what, "telemetry step panicked; record skipped");
            None
        }
    }
}

/// Request fields copied out before the request is moved into the call.
#[derive(Debug, Default)]
struct RequestFacts {
    model: Option<String>,
    prompt: Option<String>,
    prompt_hash: Option<String>,
    max_tokens: Option<u64>,
    temperature: Option<f64>,
}

impl RequestFacts {
    fn capture(request: &impl RequestMetadata, include_prompts: bool) -> Self {
        let text = request.prompt_text();
        let (prompt, prompt_hash) = match text {
            Some(t) if include_prompts => (Some(t), None),
            Some(t) => (None, Some(hash_prompt(&t))),
            None => (None, None),
        };
        Self {
            model: request.model().map(str::to_owned),
            prompt,
            prompt_hash,
            max_tokens: request.max_tokens(),
            temperature: request.temperature(),
        }
    }
}

#[derive(Debug)]
struct Pending {
    request_id: RequestId,
    operation: Operation,
    org_id: Option<OrgId>,
    project_id: Option<ProjectId>,
    start_time: Timestamp,
    started: Instant,
    sample_rate: f64,
    facts: RequestFacts,
}

/// How the call settled, as far as the record is concerned.
struct Settled {
    outcome: CallOutcome,
    usage: TokenUsage,
    response_model: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
}

impl Settled {
    fn cancelled() -> Self {
        Self {
            outcome: CallOutcome::Cancelled,
            usage: TokenUsage::default(),
            response_model: None,
            error_kind: None,
            error_message: None,
        }
    }
}

pub(crate) struct CallTracker<'a> {
    engine: &'a Engine,
    pending: Option<Pending>,
    routed_via: RoutedVia,
    route_reason: RouteReason,
}

impl<'a> CallTracker<'a> {
    /// Starts tracking. Draws the sampling decision up front so an unsampled
    /// call does no further telemetry work.
    pub(crate) fn begin(
        engine: &'a Engine,
        config: &Configuration,
        operation: Operation,
        request_id: &RequestId,
        request: &impl RequestMetadata,
        decision: ProxyDecision,
    ) -> Self {
        let routed_via = if decision.use_proxy {
            RoutedVia::Proxy
        } else {
            RoutedVia::Direct
        };
        let mut tracker = Self {
            engine,
            pending: None,
            routed_via,
            route_reason: decision.reason,
        };

        if !config.telemetry.enabled || !engine.records_telemetry() {
            return tracker;
        }
        let rate = config.telemetry.sample_rate;
        let draw: f64 = rand::thread_rng().gen();
        if !rate.admits(draw) {
            return tracker;
        }

        let include_prompts = config.telemetry.include_prompts;
        tracker.pending = contained("capture request", || {
            RequestFacts::capture(request, include_prompts)
        })
        .map(|facts| Pending {
            request_id: request_id.clone(),
            operation,
            org_id: config.org_id.clone(),
            project_id: config.project_id.clone(),
            start_time: Timestamp::now(),
            started: Instant::now(),
            sample_rate: rate.as_f64(),
            facts,
        });
        tracker
    }

    /// Records which path finally served the call.
    pub(crate) fn routed(&mut self, via: RoutedVia, reason: RouteReason) {
        self.routed_via = via;
        self.route_reason = reason;
    }

    pub(crate) fn succeeded(mut self, response: &impl ResponseMetadata) {
        if self.pending.is_none() {
            return;
        }
        let settled = contained("read response", || Settled {
            outcome: CallOutcome::Success,
            usage: response.usage().unwrap_or_default(),
            response_model: response.model().map(str::to_owned),
            error_kind: None,
            error_message: None,
        });
        self.finish(settled);
    }

    pub(crate) fn failed<E: ErrorMetadata + Display>(mut self, error: &E) {
        if self.pending.is_none() {
            return;
        }
        let settled = contained("read error", || Settled {
            outcome: if error.is_timeout() {
                CallOutcome::Timeout
            } else {
                CallOutcome::Error
            },
            usage: TokenUsage::default(),
            response_model: None,
            error_kind: Some(error.error_kind()),
            error_message: Some(truncate(&error.to_string(), MAX_ERROR_MESSAGE)),
        });
        self.finish(settled);
    }

    fn finish(&mut self, settled: Option<Settled>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let Some(settled) = settled else {
            return;
        };
        let record = build_record(pending, settled, self.routed_via, self.route_reason);
        self.engine.enqueue(record);
    }
}

impl Drop for CallTracker<'_> {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            debug!(request_id = %pending.request_id, "call dropped before completion");
            self.finish(Some(Settled::cancelled()));
        }
    }
}

fn build_record(
    pending: Pending,
    settled: Settled,
    routed_via: RoutedVia,
    route_reason: RouteReason,
) -> CallRecord {
    let Pending {
        request_id,
        operation,
        org_id,
        project_id,
        start_time,
        started,
        sample_rate,
        facts,
    } = pending;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    // Requested model first; the served name only when the request names
    // no priced model.
    let priced_model = facts
        .model
        .as_deref()
        .filter(|m| pricing_for_model(m).is_some())
        .or(settled.response_model.as_deref())
        .or(facts.model.as_deref())
        .unwrap_or(UNKNOWN_MODEL);
    let cost = estimate_cost(priced_model, &settled.usage);

    let response_model = settled
        .response_model
        .filter(|m| facts.model.as_deref() != Some(m.as_str()));
    let model = facts
        .model
        .or_else(|| response_model.clone())
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string());

    CallRecord {
        request_id,
        operation,
        model,
        response_model,
        org_id,
        project_id,
        start_time,
        end_time: Timestamp::now(),
        latency_ms,
        token_usage: settled.usage,
        cost_estimate_usd: cost,
        outcome: settled.outcome,
        error_kind: settled.error_kind,
        error_message: settled.error_message,
        routed_via,
        route_reason,
        sampling_decision: true,
        sample_rate,
        max_tokens: facts.max_tokens,
        temperature: facts.temperature,
        prompt_hash: facts.prompt_hash,
        prompt: facts.prompt,
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(facts: RequestFacts) -> Pending {
        Pending {
            request_id: RequestId::generate(),
            operation: Operation::ChatCompletion,
            org_id: OrgId::new("org"),
            project_id: None,
            start_time: Timestamp::now(),
            started: Instant::now(),
            sample_rate: 0.5,
            facts,
        }
    }

    fn success(usage: TokenUsage, response_model: Option<&str>) -> Settled {
        Settled {
            outcome: CallOutcome::Success,
            usage,
            response_model: response_model.map(str::to_owned),
            error_kind: None,
            error_message: None,
        }
    }

    #[test]
    fn facts_hash_prompt_unless_included() {
        let request = json!({ "model": "gpt-4o", "messages": "Hello", "max_tokens": 64 });

        let hashed = RequestFacts::capture(&request, false);
        assert_eq!(hashed.prompt, None);
        assert_eq!(hashed.prompt_hash.as_deref(), Some(hash_prompt("Hello").as_str()));
        assert_eq!(hashed.max_tokens, Some(64));

        let raw = RequestFacts::capture(&request, true);
        assert_eq!(raw.prompt.as_deref(), Some("Hello"));
        assert_eq!(raw.prompt_hash, None);
    }

    #[test]
    fn record_prices_by_requested_model() {
        let facts = RequestFacts {
            model: Some("gpt-4o".into()),
            ..RequestFacts::default()
        };
        let usage = TokenUsage::new(1_000_000, 0, None);
        let record = build_record(
            pending(facts),
            success(usage, Some("gpt-4o-2024-08-06")),
            RoutedVia::Direct,
            RouteReason::ProxyDisabled,
        );

        assert_eq!(record.model, "gpt-4o");
        assert_eq!(record.response_model.as_deref(), Some("gpt-4o-2024-08-06"));
        assert_eq!(record.cost_estimate_usd.as_f64(), 2.5);
        assert_eq!(record.sample_rate, 0.5);
        assert!(record.sampling_decision);
    }

    #[test]
    fn unpriced_request_model_falls_back_to_served_model() {
        let facts = RequestFacts {
            model: Some("my-deployment".into()),
            ..RequestFacts::default()
        };
        let usage = TokenUsage::new(1_000_000, 0, None);
        let record = build_record(
            pending(facts),
            success(usage, Some("gpt-4o-mini-2024-07-18")),
            RoutedVia::Direct,
            RouteReason::ProxyDisabled,
        );

        assert_eq!(record.model, "my-deployment");
        assert_eq!(record.cost_estimate_usd, estimate_cost("gpt-4o-mini", &usage));
    }

    #[test]
    fn record_falls_back_to_unknown_model() {
        let record = build_record(
            pending(RequestFacts::default()),
            Settled::cancelled(),
            RoutedVia::Direct,
            RouteReason::ProxyDisabled,
        );
        assert_eq!(record.model, UNKNOWN_MODEL);
        assert_eq!(record.outcome, CallOutcome::Cancelled);
        assert!(record.cost_estimate_usd.is_zero());
    }

    #[test]
    fn same_response_model_is_not_repeated() {
        let facts = RequestFacts {
            model: Some("gpt-4o".into()),
            ..RequestFacts::default()
        };
        let record = build_record(
            pending(facts),
            success(TokenUsage::default(), Some("gpt-4o")),
            RoutedVia::Direct,
            RouteReason::ProxyDisabled,
        );
        assert_eq!(record.response_model, None);
    }

    #[test]
    fn contained_swallows_panics() {
        assert_eq!(contained("ok", || 7), Some(7));
        assert_eq!(contained("boom", || -> u8 { panic!("accessor bug") }), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
