//! JSON rendering of a doctor run.

use std::sync::Arc;
use std::time::Duration;

use domain::{Configuration, HealthFlag, PolicyFlags};
use serde_json::{json, Value};
use telemetry::PolicyFetchError;

/// Result of one doctor run.
#[derive(Debug)]
pub struct Report {
    pub config: Arc<Configuration>,
    /// `None` when proxy routing is disabled and no probe was made.
    pub proxy_health: Option<HealthFlag>,
    pub policy: Result<PolicyFlags, PolicyFetchError>,
}

impl Report {
    pub fn to_json(&self) -> Value {
        let policy = match &self.policy {
            Ok(flags) => json!({ "ok": true, "flags": flags }),
            Err(e) => json!({ "ok": false, "error": e.to_string() }),
        };
        json!({
            "configuration": redacted_config(&self.config),
            "proxyHealth": self.proxy_health,
            "policy": policy,
        })
    }
}

/// Renders a snapshot with the credential redacted.
pub fn redacted_config(config: &Configuration) -> Value {
    let proxy = &config.proxy;
    let telemetry = &config.telemetry;
    json!({
        "apiKey": config.api_key.redacted(),
        "orgId": config.org_id.as_ref().map(|id| id.as_str()),
        "projectId": config.project_id.as_ref().map(|id| id.as_str()),
        "policyEndpoint": config.policy_endpoint,
        "proxy": {
            "enabled": proxy.enabled,
            "baseUrl": proxy.base_url,
            "failOpen": proxy.fail_open,
            "providerApiKey": proxy.provider_api_key.as_ref().map(|k| k.redacted()),
            "timeoutMs": millis(proxy.timeout),
            "healthProbeIntervalMs": millis(proxy.health_probe_interval),
        },
        "telemetry": {
            "enabled": telemetry.enabled,
            "includePrompts": telemetry.include_prompts,
            "sampleRate": telemetry.sample_rate.as_f64(),
            "endpoint": telemetry.endpoint,
            "bufferCapacity": telemetry.buffer_capacity,
            "batchSize": telemetry.batch_size,
            "flushIntervalMs": millis(telemetry.flush_interval),
            "maxDeliveryAttempts": telemetry.max_delivery_attempts,
            "backoffInitialMs": millis(telemetry.backoff_initial),
            "backoffMaxMs": millis(telemetry.backoff_max),
        },
    })
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
