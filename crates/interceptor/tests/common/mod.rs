//! Test doubles shared by the interceptor integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use domain::{ApiKey, CallRecord, Configuration, ErrorMetadata, Operation, RequestId};
use interceptor::{
    LlmClient, PolicyFetchError, PolicyFlags, PolicySource, ProxyError, ProxyTransport,
    TelemetrySink, WrapBuilder, WrappedClient,
};
use serde_json::{json, Value};

pub const FLUSH: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FakeError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("request timed out")]
    Timeout,
}

impl ErrorMetadata for FakeError {
    fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Client whose behaviour is chosen by the request's `model`:
/// `"fail"` returns an error, `"timeout"` a timeout error, `"slow"` sleeps
/// for a second; anything else echoes a completion with usage.
#[derive(Debug, Default)]
pub struct FakeClient {
    pub calls: AtomicUsize,
}

impl FakeClient {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(model: &str, kind: &str) -> Result<Value, FakeError> {
        match model {
            "fail" => Err(FakeError::RateLimited("slow down".into())),
            "timeout" => Err(FakeError::Timeout),
            _ => Ok(json!({
                "id": format!("{kind}_1"),
                "model": model,
                "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
            })),
        }
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    type ChatRequest = Value;
    type ChatResponse = Value;
    type EmbeddingRequest = Value;
    type EmbeddingResponse = Value;
    type Error = FakeError;

    async fn create_chat_completion(&self, request: Value) -> Result<Value, FakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request["model"].as_str().unwrap_or_default().to_string();
        if model == "slow" {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Self::answer(&model, "chat")
    }

    async fn create_embedding(&self, request: Value) -> Result<Value, FakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = request["model"].as_str().unwrap_or_default().to_string();
        Self::answer(&model, "emb")
    }
}

pub fn chat(model: &str) -> Value {
    json!({ "model": model, "messages": [{ "role": "user", "content": "Hello" }] })
}

// ---------------------------------------------------------------------------
// Telemetry sinks
// ---------------------------------------------------------------------------

/// Collects every delivered record.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<CallRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn deliver(
        &self,
        batch: &[CallRecord],
        _config: &Configuration,
    ) -> Result<(), domain::TelemetryError> {
        self.records.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

/// Fails every delivery with a retryable error.
#[derive(Debug, Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl TelemetrySink for FailingSink {
    async fn deliver(
        &self,
        _batch: &[CallRecord],
        _config: &Configuration,
    ) -> Result<(), domain::TelemetryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(domain::TelemetryError::Delivery {
            status: Some(503),
            reason: "control plane down".into(),
            retry_after: None,
        })
    }
}

/// Never completes a delivery.
#[derive(Debug, Default)]
pub struct StuckSink;

#[async_trait]
impl TelemetrySink for StuckSink {
    async fn deliver(
        &self,
        _batch: &[CallRecord],
        _config: &Configuration,
    ) -> Result<(), domain::TelemetryError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Proxy transport
// ---------------------------------------------------------------------------

/// Answers every forward with a fixed result.
#[derive(Debug)]
pub struct ScriptedTransport {
    answer: Result<Value, ProxyError>,
    pub calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn answering(value: Value) -> Self {
        Self {
            answer: Ok(value),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ProxyError) -> Self {
        Self {
            answer: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::failing(ProxyError::Unavailable {
            url: "http://proxy.test/chat/completions".into(),
            reason: "connection refused".into(),
            timed_out: false,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyTransport for ScriptedTransport {
    async fn forward(
        &self,
        _operation: Operation,
        _request_id: &RequestId,
        _body: Value,
        _config: &Configuration,
    ) -> Result<Value, ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

// ---------------------------------------------------------------------------
// Policy source
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FixedPolicy(pub Option<PolicyFlags>);

#[async_trait]
impl PolicySource for FixedPolicy {
    async fn fetch(&self, _config: &Configuration) -> Result<PolicyFlags, PolicyFetchError> {
        self.0
            .clone()
            .ok_or_else(|| PolicyFetchError::Transport("unreachable".into()))
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub fn config() -> Configuration {
    let mut config = Configuration::with_defaults(ApiKey::new("sk_test_key").unwrap());
    config.telemetry.flush_interval = Duration::from_secs(3600);
    config.telemetry.backoff_initial = Duration::from_millis(1);
    config.telemetry.backoff_max = Duration::from_millis(5);
    config
}

pub fn proxied_config(fail_open: bool) -> Configuration {
    let mut config = config();
    config.proxy.enabled = true;
    config.proxy.fail_open = fail_open;
    config.proxy.base_url = "http://proxy.test".into();
    config
}

pub struct Harness {
    pub client: Arc<FakeClient>,
    pub sink: Arc<MemorySink>,
    pub transport: Arc<ScriptedTransport>,
    pub wrapped: WrappedClient<FakeClient>,
}

pub fn harness(config: Configuration, transport: ScriptedTransport) -> Harness {
    let client = Arc::new(FakeClient::default());
    let sink = Arc::new(MemorySink::default());
    let transport = Arc::new(transport);
    let wrapped = WrapBuilder::new(Arc::clone(&client), config)
        .telemetry_sink(sink.clone())
        .proxy_transport(transport.clone())
        .policy_source(Arc::new(FixedPolicy(None)))
        .health_probe(false)
        .build()
        .unwrap();
    Harness {
        client,
        sink,
        transport,
        wrapped,
    }
}

pub fn direct_harness() -> Harness {
    harness(config(), ScriptedTransport::unavailable())
}
