//! Background proxy health probe.
//!
//! Routing reads the cached [`HealthFlag`] on every call and never probes
//! inline. This task refreshes the flag with `GET {base_url}/health` on the
//! configured interval while proxy routing is enabled.

use std::sync::Arc;
use std::time::Duration;

use domain::{ConfigCell, HealthFlag, HealthState};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a disabled loop rechecks the config for the proxy being enabled.
const DISABLED_RECHECK: Duration = Duration::from_secs(1);

/// Periodically probes the proxy and stores the result in a [`HealthState`].
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    state: Arc<HealthState>,
    config: Arc<ConfigCell>,
}

impl HealthProbe {
    /// Creates a probe writing into `state`.
    pub fn new(client: reqwest::Client, state: Arc<HealthState>, config: Arc<ConfigCell>) -> Self {
        Self {
            client,
            state,
            config,
        }
    }

    /// Probes once and stores the result.
    ///
    /// Any 2xx answer is healthy; everything else, including a timeout, is
    /// unhealthy. Transitions are logged once.
    pub async fn probe_once(&self) -> HealthFlag {
        let config = self.config.load();
        let url = format!("{}/health", config.proxy.base_url.trim_end_matches('/'));
        let timeout = config.proxy.timeout.min(MAX_PROBE_TIMEOUT);

        let flag = match self.client.get(&url).timeout(timeout).send().await {
            Ok(r) if r.status().is_success() => HealthFlag::Healthy,
            Ok(r) => {
                debug!(%url, status = r.status().as_u16(), "proxy health probe failed");
                HealthFlag::Unhealthy
            }
            Err(e) => {
                debug!(%url, error = %e, "proxy health probe failed");
                HealthFlag::Unhealthy
            }
        };

        let previous = self.state.set(flag);
        if previous != flag {
            match flag {
                HealthFlag::Healthy => info!(%url, "proxy is healthy"),
                _ => warn!(%url, "proxy is unhealthy; routing calls directly"),
            }
        }
        flag
    }

    /// Runs the probe loop on `runtime` until `shutdown` is cancelled.
    ///
    /// The first probe runs immediately. While proxy routing is disabled the
    /// loop leaves the flag untouched and rechecks the config every second,
    /// so enabling the proxy is followed by a probe without waiting out the
    /// full interval.
    pub fn spawn(self, runtime: &tokio::runtime::Handle, shutdown: CancellationToken) -> JoinHandle<()> {
        runtime.spawn(async move {
            loop {
                let config = self.config.load();
                let wait = if config.proxy.enabled {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.probe_once() => {}
                    }
                    config.proxy.health_probe_interval
                } else {
                    config.proxy.health_probe_interval.min(DISABLED_RECHECK)
                };

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            debug!("proxy health probe stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ApiKey, Configuration};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe_for(base_url: String) -> (HealthProbe, Arc<HealthState>) {
        let mut config = Configuration::with_defaults(ApiKey::new("k").unwrap());
        config.proxy.enabled = true;
        config.proxy.base_url = base_url;
        config.proxy.health_probe_interval = Duration::from_millis(20);
        let state = Arc::new(HealthState::new());
        let probe = HealthProbe::new(
            reqwest::Client::new(),
            Arc::clone(&state),
            Arc::new(ConfigCell::new(config)),
        );
        (probe, state)
    }

    #[tokio::test]
    async fn healthy_endpoint_sets_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (probe, state) = probe_for(server.uri());
        assert_eq!(state.get(), HealthFlag::Unknown);
        assert_eq!(probe.probe_once().await, HealthFlag::Healthy);
        assert_eq!(state.get(), HealthFlag::Healthy);
    }

    #[tokio::test]
    async fn failing_endpoint_sets_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (probe, state) = probe_for(server.uri());
        assert_eq!(probe.probe_once().await, HealthFlag::Unhealthy);
        assert_eq!(state.get(), HealthFlag::Unhealthy);
    }

    #[tokio::test]
    async fn unreachable_endpoint_sets_unhealthy() {
        let (probe, state) = probe_for("http://127.0.0.1:1".into());
        probe.probe_once().await;
        assert_eq!(state.get(), HealthFlag::Unhealthy);
    }

    #[tokio::test]
    async fn loop_recovers_flag_and_stops_on_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (probe, state) = probe_for(server.uri());
        state.set(HealthFlag::Unhealthy);

        let shutdown = CancellationToken::new();
        let task = probe.spawn(&tokio::runtime::Handle::current(), shutdown.clone());

        for _ in 0..100 {
            if state.get() == HealthFlag::Healthy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.get(), HealthFlag::Healthy);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("probe loop should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn enabling_the_proxy_checks_health_before_the_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut config = Configuration::with_defaults(ApiKey::new("k").unwrap());
        config.proxy.base_url = server.uri();
        config.proxy.health_probe_interval = Duration::from_secs(3600);
        let cell = Arc::new(ConfigCell::new(config.clone()));
        let state = Arc::new(HealthState::new());
        let probe = HealthProbe::new(reqwest::Client::new(), Arc::clone(&state), Arc::clone(&cell));

        let shutdown = CancellationToken::new();
        let _task = probe.spawn(&tokio::runtime::Handle::current(), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.get(), HealthFlag::Unknown);

        config.proxy.enabled = true;
        cell.store(config);

        for _ in 0..300 {
            if state.get() == HealthFlag::Healthy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.get(), HealthFlag::Healthy);
        shutdown.cancel();
    }
}
