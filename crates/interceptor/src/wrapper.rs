//! The wrapped client and its control surface.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    decide, Configuration, HealthFlag, LlmClient, Operation, PolicyFlags, ProxyError,
    RequestId, RequestMetadata, ResponseMetadata, RouteReason, RoutedVia, SkewError,
    UpstreamError,
};
use proxy::proxy_url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use telemetry::TelemetryStats;
use tracing::{debug, debug_span, warn, Instrument};

use crate::call::CallTracker;
use crate::engine::Engine;

/// An [`LlmClient`] whose calls are timed, optionally proxied, and reported.
///
/// `WrappedClient<C>` implements [`LlmClient`] itself, so it drops in
/// wherever `C` was used. Its error type is [`UpstreamError<C::Error>`]: with
/// proxying disabled every error is [`UpstreamError::Client`] carrying the
/// client's own value untouched.
///
/// Cloning is cheap and clones share the same configuration, buffer and
/// background tasks. The tasks stop when the last clone is dropped or when
/// [`WrappedClient::shutdown`] is called.
pub struct WrappedClient<C> {
    inner: Arc<C>,
    engine: Arc<Engine>,
}

impl<C> Clone for WrappedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<C> std::fmt::Debug for WrappedClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedClient")
            .field("client", &std::any::type_name::<C>())
            .field("proxy_health", &self.engine.health())
            .finish_non_exhaustive()
    }
}

impl<C: LlmClient> WrappedClient<C> {
    pub(crate) fn new(inner: Arc<C>, engine: Engine) -> Self {
        Self {
            inner,
            engine: Arc::new(engine),
        }
    }

    async fn intercept<Req, Resp, F, Fut>(
        &self,
        operation: Operation,
        request: Req,
        direct: F,
    ) -> Result<Resp, UpstreamError<C::Error>>
    where
        Req: RequestMetadata + Serialize + Send + Sync,
        Resp: ResponseMetadata + DeserializeOwned + Send,
        F: FnOnce(Req) -> Fut + Send,
        Fut: Future<Output = Result<Resp, C::Error>> + Send,
    {
        let config = self.engine.snapshot();
        let request_id = RequestId::generate();
        let decision = decide(operation, &config, self.engine.health());
        let span = debug_span!(
            "intercept",
            request_id = %request_id,
            operation = %operation,
            use_proxy = decision.use_proxy,
        );

        async move {
            let mut tracker = CallTracker::begin(
                &self.engine,
                &config,
                operation,
                &request_id,
                &request,
                decision,
            );

            let result = if decision.use_proxy {
                match self.via_proxy(operation, &request_id, &request, &config).await {
                    Ok(response) => Ok(response),
                    Err(err) => {
                        self.engine.note_proxy_failure(&err);
                        if err.allows_fallback() && config.proxy.fail_open {
                            warn!(error = %err, "proxy unavailable; falling back to direct call");
                            tracker.routed(RoutedVia::Direct, RouteReason::ProxyUnavailable);
                            direct(request).await.map_err(UpstreamError::Client)
                        } else {
                            Err(UpstreamError::Proxy(err))
                        }
                    }
                }
            } else {
                direct(request).await.map_err(UpstreamError::Client)
            };

            match &result {
                Ok(response) => tracker.succeeded(response),
                Err(error) => {
                    debug!(error = %error, "call failed");
                    tracker.failed(error);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn via_proxy<Req, Resp>(
        &self,
        operation: Operation,
        request_id: &RequestId,
        request: &Req,
        config: &Configuration,
    ) -> Result<Resp, ProxyError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let unavailable = |reason: String| ProxyError::Unavailable {
            url: proxy_url(&config.proxy.base_url, operation),
            reason,
            timed_out: false,
        };

        let body = serde_json::to_value(request)
            .map_err(|e| unavailable(format!("request could not be encoded: {e}")))?;
        let answer = self
            .engine
            .transport()
            .forward(operation, request_id, body, config)
            .await?;
        serde_json::from_value(answer)
            .map_err(|e| unavailable(format!("response could not be decoded: {e}")))
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Returns the original client.
    ///
    /// This is the same allocation that was wrapped. Calls made on it bypass
    /// routing and produce no telemetry.
    pub fn unwrap(&self) -> Arc<C> {
        Arc::clone(&self.inner)
    }

    /// Stops recording: pending records are discarded and calls made while
    /// paused produce none. Idempotent.
    pub fn pause_telemetry(&self) {
        self.engine.pause_telemetry();
    }

    /// Resumes recording after [`WrappedClient::pause_telemetry`]. Idempotent.
    pub fn resume_telemetry(&self) {
        self.engine.resume_telemetry();
    }

    /// Delivers the pending records now, waiting at most `timeout`.
    ///
    /// Returns `false` if the flush did not finish in time or telemetry is
    /// not running.
    pub async fn flush_telemetry(&self, timeout: Duration) -> bool {
        self.engine.flush_telemetry(timeout).await
    }

    /// Whether the current configuration routes calls through the proxy.
    pub fn is_proxy_active(&self) -> bool {
        self.engine.snapshot().proxy.enabled
    }

    /// Last known proxy reachability.
    pub fn proxy_health(&self) -> HealthFlag {
        self.engine.health()
    }

    /// Buffer and delivery counters.
    pub fn telemetry_stats(&self) -> TelemetryStats {
        self.engine.telemetry_stats()
    }

    /// The configuration new calls will use.
    pub fn config(&self) -> Arc<Configuration> {
        self.engine.snapshot()
    }

    /// Replaces the configuration. Calls already running keep the snapshot
    /// they started with.
    ///
    /// Buffer capacity and flush interval are fixed at wrap time and are not
    /// affected.
    pub fn refresh(&self, config: Configuration) -> Result<(), SkewError> {
        self.engine.refresh(config)
    }

    /// Applies control-plane overrides onto the current configuration.
    pub fn refresh_policy(&self, flags: &PolicyFlags) -> Result<(), SkewError> {
        self.engine.refresh_policy(flags)
    }

    /// Pulls policy from the control plane and applies it.
    ///
    /// Failures are logged and leave the configuration unchanged. Returns
    /// whether a policy was applied.
    pub async fn sync_policy(&self) -> bool {
        self.engine.sync_policy().await
    }

    /// Stops the background tasks after a final best-effort flush, waiting
    /// at most `timeout` for each. Calls keep working afterwards but are no
    /// longer reported.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.engine.shutdown(timeout).await
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for WrappedClient<C> {
    type ChatRequest = C::ChatRequest;
    type ChatResponse = C::ChatResponse;
    type EmbeddingRequest = C::EmbeddingRequest;
    type EmbeddingResponse = C::EmbeddingResponse;
    type Error = UpstreamError<C::Error>;

    async fn create_chat_completion(
        &self,
        request: Self::ChatRequest,
    ) -> Result<Self::ChatResponse, Self::Error> {
        self.intercept(Operation::ChatCompletion, request, |req| {
            self.inner.create_chat_completion(req)
        })
        .await
    }

    async fn create_embedding(
        &self,
        request: Self::EmbeddingRequest,
    ) -> Result<Self::EmbeddingResponse, Self::Error> {
        self.intercept(Operation::Embedding, request, |req| {
            self.inner.create_embedding(req)
        })
        .await
    }
}
