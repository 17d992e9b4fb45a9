//! Construction of a [`WrappedClient`].

use std::sync::Arc;

use domain::{
    ConfigError, ConfigResolver, Configuration, LlmClient, SettingsSource, SkewError,
    WrapOptions,
};
use proxy::{HttpProxyTransport, ProxyTransport};
use telemetry::{HttpPolicyClient, HttpTelemetrySink, PolicySource, TelemetrySink};
use tracing::info;

use crate::engine::{Engine, EngineParts};
use crate::WrappedClient;

/// Wraps `client`, resolving configuration from `options` and the process
/// environment.
///
/// Fails with [`SkewError::Configuration`] when no control-plane API key is
/// available or a setting is invalid.
pub fn wrap<C: LlmClient>(
    client: C,
    options: WrapOptions,
) -> Result<WrappedClient<C>, SkewError> {
    wrap_with_resolver(client, options, &ConfigResolver::from_env())
}

/// Like [`wrap`], reading settings from `resolver` instead of the process
/// environment.
pub fn wrap_with_resolver<C: LlmClient, S: SettingsSource>(
    client: C,
    options: WrapOptions,
    resolver: &ConfigResolver<S>,
) -> Result<WrappedClient<C>, SkewError> {
    let config = resolver.resolve(&options)?;
    WrapBuilder::new(Arc::new(client), config).build()
}

/// Assembles a [`WrappedClient`] from a resolved [`Configuration`].
///
/// Transports default to the HTTP implementations sharing one connection
/// pool; each can be replaced, which is how tests run without a network.
pub struct WrapBuilder<C> {
    client: Arc<C>,
    config: Configuration,
    transport: Option<Arc<dyn ProxyTransport>>,
    sink: Option<Arc<dyn TelemetrySink>>,
    policy: Option<Arc<dyn PolicySource>>,
    health_probe: bool,
}

impl<C: LlmClient> WrapBuilder<C> {
    /// Starts a builder for `client` with `config`.
    ///
    /// The `Arc` is kept as is; [`WrappedClient::unwrap`] hands back this
    /// same allocation.
    pub fn new(client: Arc<C>, config: Configuration) -> Self {
        Self {
            client,
            config,
            transport: None,
            sink: None,
            policy: None,
            health_probe: true,
        }
    }

    /// Uses `transport` for proxied calls.
    pub fn proxy_transport(mut self, transport: Arc<dyn ProxyTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Delivers telemetry batches to `sink`.
    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Fetches policy from `source`.
    pub fn policy_source(mut self, source: Arc<dyn PolicySource>) -> Self {
        self.policy = Some(source);
        self
    }

    /// Enables or disables the background health probe (enabled by default).
    ///
    /// Without the probe the health flag stays `Unknown`, so an enabled proxy
    /// is always attempted first.
    pub fn health_probe(mut self, enabled: bool) -> Self {
        self.health_probe = enabled;
        self
    }

    /// Validates the configuration and starts the background tasks.
    pub fn build(self) -> Result<WrappedClient<C>, SkewError> {
        self.config.validate()?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient {
                reason: e.to_string(),
            })?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpProxyTransport::with_client(http.clone())));
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(HttpTelemetrySink::with_client(http.clone())));
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(HttpPolicyClient::with_client(http.clone())));

        info!(
            api_key = %self.config.api_key,
            proxy_enabled = self.config.proxy.enabled,
            telemetry_enabled = self.config.telemetry.enabled,
            sample_rate = self.config.telemetry.sample_rate.as_f64(),
            "wrapping client"
        );

        let engine = Engine::start(EngineParts {
            config: self.config,
            transport,
            sink,
            policy,
            http,
            health_probe: self.health_probe,
        });
        Ok(WrappedClient::new(self.client, engine))
    }
}
