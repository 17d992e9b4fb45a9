//! The live checks a doctor run performs.

use std::sync::Arc;

use domain::{ConfigCell, Configuration, HealthState};
use proxy::HealthProbe;
use telemetry::{HttpPolicyClient, PolicySource};
use tracing::{info, warn};

use crate::report::Report;

/// Probes the proxy (when routing is enabled) and fetches the policy.
///
/// Neither check fails the run; their outcomes are part of the report.
pub async fn run(config: Configuration, http: reqwest::Client) -> Report {
    let cell = Arc::new(ConfigCell::new(config));
    let config = cell.load();

    let proxy_health = if config.proxy.enabled {
        let probe = HealthProbe::new(http.clone(), Arc::new(HealthState::new()), Arc::clone(&cell));
        let flag = probe.probe_once().await;
        info!(base_url = %config.proxy.base_url, health = ?flag, "proxy probed");
        Some(flag)
    } else {
        info!("proxy routing disabled; health probe skipped");
        None
    };

    let policy = HttpPolicyClient::with_client(http).fetch(&config).await;
    if let Err(e) = &policy {
        warn!(endpoint = %config.policy_endpoint, error = %e, "policy fetch failed");
    }

    Report {
        config,
        proxy_health,
        policy,
    }
}
