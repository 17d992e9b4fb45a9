//! Capability interface of the wrapped client.
//!
//! The interceptor does not reach into arbitrary client methods. Instead the
//! client implements [`LlmClient`], which names the finite set of call sites
//! that can be intercepted. Request, response and error types stay the
//! client's own; the interceptor only reads them through the optional
//! accessors of [`RequestMetadata`], [`ResponseMetadata`] and
//! [`ErrorMetadata`], all of which default to "absent".
//!
//! Serde bounds exist for proxying: a request is re-encoded as JSON for the
//! proxy and the proxy's JSON answer is decoded back into the client's own
//! response type.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{ProxyError, TokenUsage, UpstreamError};

/// The call sites of an LLM client that can be intercepted.
#[async_trait]
pub trait LlmClient: Send + Sync + 'static {
    /// Chat completion request.
    type ChatRequest: RequestMetadata + Serialize + Send + Sync + 'static;
    /// Chat completion response.
    type ChatResponse: ResponseMetadata + DeserializeOwned + Send + 'static;
    /// Embedding request.
    type EmbeddingRequest: RequestMetadata + Serialize + Send + Sync + 'static;
    /// Embedding response.
    type EmbeddingResponse: ResponseMetadata + DeserializeOwned + Send + 'static;
    /// Error returned by either call site.
    type Error: ErrorMetadata + std::error::Error + Send + Sync + 'static;

    /// Creates a chat completion.
    async fn create_chat_completion(
        &self,
        request: Self::ChatRequest,
    ) -> Result<Self::ChatResponse, Self::Error>;

    /// Creates embeddings.
    async fn create_embedding(
        &self,
        request: Self::EmbeddingRequest,
    ) -> Result<Self::EmbeddingResponse, Self::Error>;
}

// ---------------------------------------------------------------------------
// Metadata accessors
// ---------------------------------------------------------------------------

/// Optional fields the interceptor reads from a request.
pub trait RequestMetadata {
    /// Model requested by the caller.
    fn model(&self) -> Option<&str> {
        None
    }

    /// Prompt text, used for the prompt digest (or verbatim when prompts are
    /// included in telemetry).
    fn prompt_text(&self) -> Option<String> {
        None
    }

    /// Requested completion token limit.
    fn max_tokens(&self) -> Option<u64> {
        None
    }

    /// Requested sampling temperature.
    fn temperature(&self) -> Option<f64> {
        None
    }
}

/// Optional fields the interceptor reads from a response.
pub trait ResponseMetadata {
    /// Model that actually served the call (may differ from the request when
    /// the proxy substitutes a model).
    fn model(&self) -> Option<&str> {
        None
    }

    /// Token usage.
    fn usage(&self) -> Option<TokenUsage> {
        None
    }
}

/// Classification of a client error for telemetry.
pub trait ErrorMetadata {
    /// Short error class name reported as `errorKind`.
    ///
    /// Defaults to the unqualified Rust type name.
    fn error_kind(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Returns `true` if the error represents a timeout.
    fn is_timeout(&self) -> bool {
        false
    }
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

impl<E> ErrorMetadata for UpstreamError<E>
where
    E: ErrorMetadata + std::error::Error + 'static,
{
    fn error_kind(&self) -> String {
        match self {
            Self::Client(e) => e.error_kind(),
            Self::Proxy(e) => e.error_kind(),
        }
    }

    fn is_timeout(&self) -> bool {
        match self {
            Self::Client(e) => e.is_timeout(),
            Self::Proxy(e) => e.is_timeout(),
        }
    }
}

impl ErrorMetadata for ProxyError {
    fn error_kind(&self) -> String {
        match self {
            Self::Unavailable { .. } => "ProxyUnavailable".to_string(),
            Self::Rejected { .. } => "ProxyRejected".to_string(),
        }
    }

    fn is_timeout(&self) -> bool {
        ProxyError::is_timeout(self)
    }
}

// ---------------------------------------------------------------------------
// Untyped JSON payloads
// ---------------------------------------------------------------------------

impl RequestMetadata for Value {
    fn model(&self) -> Option<&str> {
        self.get("model").and_then(Value::as_str)
    }

    fn prompt_text(&self) -> Option<String> {
        self.get("messages")
            .or_else(|| self.get("input"))
            .or_else(|| self.get("prompt"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    fn max_tokens(&self) -> Option<u64> {
        self.get("max_tokens")
            .or_else(|| self.get("max_completion_tokens"))
            .and_then(Value::as_u64)
    }

    fn temperature(&self) -> Option<f64> {
        self.get("temperature").and_then(Value::as_f64)
    }
}

impl ResponseMetadata for Value {
    fn model(&self) -> Option<&str> {
        self.get("model").and_then(Value::as_str)
    }

    fn usage(&self) -> Option<TokenUsage> {
        let usage = self.get("usage")?;
        let field = |name: &str| usage.get(name).and_then(Value::as_u64);
        let prompt = field("prompt_tokens").or_else(|| field("input_tokens"))?;
        let completion = field("completion_tokens")
            .or_else(|| field("output_tokens"))
            .unwrap_or(0);
        Some(TokenUsage::new(prompt, completion, field("total_tokens")))
    }
}
