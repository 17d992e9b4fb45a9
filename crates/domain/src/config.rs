//! Configuration snapshot and resolver.
//!
//! A [`Configuration`] is immutable once built. The interceptor holds it
//! behind an `Arc` and replaces the whole snapshot on refresh, so a call
//! always observes one consistent set of values.
//!
//! ## Precedence
//!
//! [`ConfigResolver::resolve`] merges three layers, first match wins:
//!
//! 1. explicit [`WrapOptions`] passed by the caller,
//! 2. the [`SettingsSource`] (process environment by default),
//! 3. built-in defaults.
//!
//! The control-plane API key has no default; its absence is a
//! [`ConfigError::MissingCredential`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ApiKey, ConfigError, OrgId, ProjectId, SampleRate};

/// Names of the environment-style settings.
pub mod settings {
    /// Control-plane API key (required).
    pub const API_KEY: &str = "SKEW_API_KEY";
    /// Route calls through the managed proxy.
    pub const PROXY_ENABLED: &str = "SKEW_PROXY_ENABLED";
    /// Proxy base URL.
    pub const BASE_URL: &str = "SKEW_BASE_URL";
    /// Fall back to a direct call when the proxy is unavailable.
    pub const FAIL_OPEN: &str = "SKEW_FAIL_OPEN";
    /// Model-provider credential forwarded to the proxy.
    pub const PROVIDER_API_KEY: &str = "SKEW_PROVIDER_API_KEY";
    /// Proxy request timeout in milliseconds.
    pub const PROXY_TIMEOUT_MS: &str = "SKEW_PROXY_TIMEOUT_MS";
    /// Interval between proxy health probes in milliseconds.
    pub const HEALTH_PROBE_INTERVAL_MS: &str = "SKEW_HEALTH_PROBE_INTERVAL_MS";
    /// Organisation identifier.
    pub const ORG_ID: &str = "SKEW_ORG_ID";
    /// Project identifier.
    pub const PROJECT_ID: &str = "SKEW_PROJECT_ID";
    /// Emit telemetry at all.
    pub const TELEMETRY_ENABLED: &str = "SKEW_TELEMETRY_ENABLED";
    /// Control-plane telemetry endpoint.
    pub const TELEMETRY_ENDPOINT: &str = "SKEW_TELEMETRY_ENDPOINT";
    /// Control-plane policy endpoint.
    pub const POLICY_ENDPOINT: &str = "SKEW_POLICY_ENDPOINT";
    /// Include raw prompt text in records.
    pub const INCLUDE_PROMPTS: &str = "SKEW_INCLUDE_PROMPTS";
    /// Fraction of calls recorded.
    pub const SAMPLE_RATE: &str = "SKEW_SAMPLE_RATE";
    /// Maximum records held in memory.
    pub const BUFFER_CAPACITY: &str = "SKEW_BUFFER_CAPACITY";
    /// Records per delivery batch.
    pub const BATCH_SIZE: &str = "SKEW_BATCH_SIZE";
    /// Periodic flush interval in milliseconds.
    pub const FLUSH_INTERVAL_MS: &str = "SKEW_FLUSH_INTERVAL_MS";
    /// Delivery attempts per batch before it is dropped.
    pub const MAX_DELIVERY_ATTEMPTS: &str = "SKEW_MAX_DELIVERY_ATTEMPTS";
    /// First retry delay in milliseconds.
    pub const BACKOFF_INITIAL_MS: &str = "SKEW_BACKOFF_INITIAL_MS";
    /// Retry delay ceiling in milliseconds.
    pub const BACKOFF_MAX_MS: &str = "SKEW_BACKOFF_MAX_MS";
}

/// Built-in defaults.
pub mod defaults {
    use std::time::Duration;

    /// Managed proxy base URL.
    pub const BASE_URL: &str = "https://api.skew.ai/v1/openai";
    /// Telemetry ingestion endpoint.
    pub const TELEMETRY_ENDPOINT: &str = "https://api.skew.ai/v1/telemetry";
    /// Policy endpoint.
    pub const POLICY_ENDPOINT: &str = "https://api.skew.ai/v1/policy";
    /// Buffer capacity.
    pub const BUFFER_CAPACITY: usize = 4096;
    /// Batch size.
    pub const BATCH_SIZE: usize = 10;
    /// Flush interval.
    pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
    /// Delivery attempts per batch.
    pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;
    /// First retry delay.
    pub const BACKOFF_INITIAL: Duration = Duration::from_millis(500);
    /// Retry delay ceiling.
    pub const BACKOFF_MAX: Duration = Duration::from_secs(5);
    /// Proxy request timeout.
    pub const PROXY_TIMEOUT: Duration = Duration::from_secs(30);
    /// Health probe interval.
    pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Proxy routing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxySettings {
    /// Whether calls are routed through the proxy.
    pub enabled: bool,
    /// Proxy base URL; operation paths are appended to it.
    pub base_url: String,
    /// Fall back to a direct call when the proxy is unavailable.
    pub fail_open: bool,
    /// Credential the proxy uses to call the model provider on the caller's
    /// behalf. Never logged; `Debug` redacts it.
    pub provider_api_key: Option<ApiKey>,
    /// Timeout for a single proxied request.
    pub timeout: Duration,
    /// Interval between background health probes.
    pub health_probe_interval: Duration,
}

/// Telemetry pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySettings {
    /// Whether records are produced at all.
    pub enabled: bool,
    /// Include raw prompt text instead of a digest.
    pub include_prompts: bool,
    /// Fraction of calls recorded.
    pub sample_rate: SampleRate,
    /// Control-plane ingestion endpoint.
    pub endpoint: String,
    /// Maximum records held in memory.
    pub buffer_capacity: usize,
    /// Records per delivery batch.
    pub batch_size: usize,
    /// Periodic flush interval.
    pub flush_interval: Duration,
    /// Delivery attempts per batch before it is dropped.
    pub max_delivery_attempts: u32,
    /// First retry delay.
    pub backoff_initial: Duration,
    /// Retry delay ceiling.
    pub backoff_max: Duration,
}

/// Immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Control-plane credential.
    pub api_key: ApiKey,
    /// Organisation the calls are attributed to.
    pub org_id: Option<OrgId>,
    /// Project the calls are grouped under.
    pub project_id: Option<ProjectId>,
    /// Policy endpoint on the control plane.
    pub policy_endpoint: String,
    /// Proxy routing settings.
    pub proxy: ProxySettings,
    /// Telemetry pipeline settings.
    pub telemetry: TelemetrySettings,
}

impl Configuration {
    /// Builds a snapshot with default settings for the given key.
    pub fn with_defaults(api_key: ApiKey) -> Self {
        Self {
            api_key,
            org_id: None,
            project_id: None,
            policy_endpoint: defaults::POLICY_ENDPOINT.to_string(),
            proxy: ProxySettings {
                enabled: false,
                base_url: defaults::BASE_URL.to_string(),
                fail_open: true,
                provider_api_key: None,
                timeout: defaults::PROXY_TIMEOUT,
                health_probe_interval: defaults::HEALTH_PROBE_INTERVAL,
            },
            telemetry: TelemetrySettings {
                enabled: true,
                include_prompts: false,
                sample_rate: SampleRate::ALWAYS,
                endpoint: defaults::TELEMETRY_ENDPOINT.to_string(),
                buffer_capacity: defaults::BUFFER_CAPACITY,
                batch_size: defaults::BATCH_SIZE,
                flush_interval: defaults::FLUSH_INTERVAL,
                max_delivery_attempts: defaults::MAX_DELIVERY_ATTEMPTS,
                backoff_initial: defaults::BACKOFF_INITIAL,
                backoff_max: defaults::BACKOFF_MAX,
            },
        }
    }

    /// Checks the invariants that the field types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(settings::BASE_URL, &self.proxy.base_url)?;
        validate_url(settings::TELEMETRY_ENDPOINT, &self.telemetry.endpoint)?;
        validate_url(settings::POLICY_ENDPOINT, &self.policy_endpoint)?;

        let positive = |setting: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    setting,
                    value: value.to_string(),
                    expected: "a positive integer",
                })
            } else {
                Ok(())
            }
        };
        positive(settings::BUFFER_CAPACITY, self.telemetry.buffer_capacity as u64)?;
        positive(settings::BATCH_SIZE, self.telemetry.batch_size as u64)?;
        positive(
            settings::MAX_DELIVERY_ATTEMPTS,
            u64::from(self.telemetry.max_delivery_attempts),
        )?;
        positive(
            settings::FLUSH_INTERVAL_MS,
            self.telemetry.flush_interval.as_millis() as u64,
        )?;
        positive(
            settings::PROXY_TIMEOUT_MS,
            self.proxy.timeout.as_millis() as u64,
        )?;
        positive(
            settings::HEALTH_PROBE_INTERVAL_MS,
            self.proxy.health_probe_interval.as_millis() as u64,
        )?;
        Ok(())
    }

    /// Returns a new snapshot with the control-plane policy flags applied.
    ///
    /// Fields absent from `flags` keep their current value. The result is
    /// validated; on error the caller keeps the current snapshot.
    pub fn with_policy(&self, flags: &PolicyFlags) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = flags.proxy_enabled {
            next.proxy.enabled = v;
        }
        if let Some(v) = flags.fail_open {
            next.proxy.fail_open = v;
        }
        if let Some(v) = flags.telemetry_enabled {
            next.telemetry.enabled = v;
        }
        if let Some(v) = flags.include_prompts {
            next.telemetry.include_prompts = v;
        }
        if let Some(v) = flags.sample_rate {
            next.telemetry.sample_rate =
                SampleRate::new(v).ok_or_else(|| ConfigError::InvalidSampleRate {
                    value: v.to_string(),
                })?;
        }
        next.validate()?;
        Ok(next)
    }
}

fn validate_url(setting: &'static str, url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::InvalidUrl {
            setting,
            url: url.to_string(),
            reason: "scheme must be http or https".to_string(),
        })?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::InvalidUrl {
            setting,
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared cell
// ---------------------------------------------------------------------------

/// Holds the active snapshot and swaps it atomically.
///
/// Readers clone the inner `Arc`, so a call keeps the snapshot it loaded at
/// its start even if a refresh lands mid-call. The lock is held only for the
/// pointer copy or swap.
#[derive(Debug)]
pub struct ConfigCell(RwLock<Arc<Configuration>>);

impl ConfigCell {
    /// Creates a cell holding `config`.
    pub fn new(config: Configuration) -> Self {
        Self(RwLock::new(Arc::new(config)))
    }

    /// Returns the current snapshot.
    pub fn load(&self) -> Arc<Configuration> {
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the snapshot, returning the previous one.
    pub fn store(&self, config: Configuration) -> Arc<Configuration> {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(config))
    }
}

// ---------------------------------------------------------------------------
// Policy overlay
// ---------------------------------------------------------------------------

/// Runtime flags served by the control plane.
///
/// Every field is optional: the control plane only sends what it wants to
/// change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFlags {
    /// Enable or disable proxy routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_enabled: Option<bool>,
    /// Enable or disable fail-open fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_open: Option<bool>,
    /// Enable or disable telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_enabled: Option<bool>,
    /// Include raw prompts in records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_prompts: Option<bool>,
    /// New sample rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
}

// ---------------------------------------------------------------------------
// Explicit options
// ---------------------------------------------------------------------------

/// Settings passed explicitly by the caller. `None` defers to the next layer.
#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    api_key: Option<Redacted>,
    org_id: Option<String>,
    project_id: Option<String>,
    proxy_enabled: Option<bool>,
    base_url: Option<String>,
    fail_open: Option<bool>,
    provider_api_key: Option<Redacted>,
    proxy_timeout: Option<Duration>,
    health_probe_interval: Option<Duration>,
    telemetry_enabled: Option<bool>,
    telemetry_endpoint: Option<String>,
    policy_endpoint: Option<String>,
    include_prompts: Option<bool>,
    sample_rate: Option<f64>,
    buffer_capacity: Option<usize>,
    batch_size: Option<usize>,
    flush_interval: Option<Duration>,
    max_delivery_attempts: Option<u32>,
    backoff_initial: Option<Duration>,
    backoff_max: Option<Duration>,
}

/// Explicit credential whose `Debug` output hides the value.
#[derive(Clone, Default)]
struct Redacted(String);

impl std::fmt::Debug for Redacted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("\"****\"")
    }
}

// The literal arms must stay first: `$ty:ty` cannot backtrack.
macro_rules! option_setter {
    ($(#[$attr:meta])* $method:ident, $field:ident: secret) => {
        $(#[$attr])*
        pub fn $method(mut self, value: impl Into<String>) -> Self {
            self.$field = Some(Redacted(value.into()));
            self
        }
    };
    ($(#[$attr:meta])* $method:ident, $field:ident: into String) => {
        $(#[$attr])*
        pub fn $method(mut self, value: impl Into<String>) -> Self {
            self.$field = Some(value.into());
            self
        }
    };
    ($(#[$attr:meta])* $method:ident, $field:ident: $ty:ty) => {
        $(#[$attr])*
        pub fn $method(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

impl WrapOptions {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(
        /// Sets the control-plane API key.
        with_api_key, api_key: secret
    );
    option_setter!(
        /// Sets the organisation identifier.
        with_org_id, org_id: into String
    );
    option_setter!(
        /// Sets the project identifier.
        with_project_id, project_id: into String
    );
    option_setter!(
        /// Enables or disables proxy routing.
        with_proxy_enabled, proxy_enabled: bool
    );
    option_setter!(
        /// Sets the proxy base URL.
        with_base_url, base_url: into String
    );
    option_setter!(
        /// Enables or disables fail-open fallback.
        with_fail_open, fail_open: bool
    );
    option_setter!(
        /// Sets the model-provider credential forwarded on proxied calls.
        with_provider_api_key, provider_api_key: secret
    );
    option_setter!(
        /// Sets the proxy request timeout.
        with_proxy_timeout, proxy_timeout: Duration
    );
    option_setter!(
        /// Sets the health probe interval.
        with_health_probe_interval, health_probe_interval: Duration
    );
    option_setter!(
        /// Enables or disables telemetry.
        with_telemetry_enabled, telemetry_enabled: bool
    );
    option_setter!(
        /// Sets the telemetry endpoint.
        with_telemetry_endpoint, telemetry_endpoint: into String
    );
    option_setter!(
        /// Sets the policy endpoint.
        with_policy_endpoint, policy_endpoint: into String
    );
    option_setter!(
        /// Records raw prompts instead of digests.
        with_include_prompts, include_prompts: bool
    );
    option_setter!(
        /// Sets the sample rate (validated at resolve time).
        with_sample_rate, sample_rate: f64
    );
    option_setter!(
        /// Sets the buffer capacity.
        with_buffer_capacity, buffer_capacity: usize
    );
    option_setter!(
        /// Sets the batch size.
        with_batch_size, batch_size: usize
    );
    option_setter!(
        /// Sets the periodic flush interval.
        with_flush_interval, flush_interval: Duration
    );
    option_setter!(
        /// Sets the number of delivery attempts per batch.
        with_max_delivery_attempts, max_delivery_attempts: u32
    );
    option_setter!(
        /// Sets the first retry delay.
        with_backoff_initial, backoff_initial: Duration
    );
    option_setter!(
        /// Sets the retry delay ceiling.
        with_backoff_max, backoff_max: Duration
    );
}

// ---------------------------------------------------------------------------
// Settings sources
// ---------------------------------------------------------------------------

/// An environment-style key/value lookup.
pub trait SettingsSource: Send + Sync {
    /// Returns the raw value of `name`, or `None` if unset.
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads settings from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// In-memory settings, for embedding hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSettings(HashMap<String, String>);

impl MapSettings {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a setting.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl SettingsSource for MapSettings {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Merges explicit options, a settings source and defaults.
#[derive(Debug, Clone)]
pub struct ConfigResolver<S = EnvSettings> {
    source: S,
}

impl ConfigResolver<EnvSettings> {
    /// Creates a resolver backed by the process environment.
    pub fn from_env() -> Self {
        Self {
            source: EnvSettings,
        }
    }
}

impl<S: SettingsSource> ConfigResolver<S> {
    /// Creates a resolver backed by `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Resolves a validated snapshot.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingCredential`] when no API key is supplied.
    /// - [`ConfigError::InvalidSampleRate`], [`ConfigError::InvalidValue`] or
    ///   [`ConfigError::InvalidUrl`] when a supplied value is malformed.
    pub fn resolve(&self, explicit: &WrapOptions) -> Result<Configuration, ConfigError> {
        let api_key = explicit
            .api_key
            .clone()
            .map(|k| k.0)
            .or_else(|| self.source.get(settings::API_KEY))
            .and_then(ApiKey::new)
            .ok_or(ConfigError::MissingCredential {
                setting: settings::API_KEY,
            })?;

        let mut config = Configuration::with_defaults(api_key);

        config.org_id = self.string(explicit.org_id.clone(), settings::ORG_ID).and_then(OrgId::new);
        config.project_id = self
            .string(explicit.project_id.clone(), settings::PROJECT_ID)
            .and_then(ProjectId::new);
        if let Some(v) = self.string(explicit.policy_endpoint.clone(), settings::POLICY_ENDPOINT) {
            config.policy_endpoint = v;
        }

        let proxy = &mut config.proxy;
        if let Some(v) = self.flag(explicit.proxy_enabled, settings::PROXY_ENABLED)? {
            proxy.enabled = v;
        }
        if let Some(v) = self.string(explicit.base_url.clone(), settings::BASE_URL) {
            proxy.base_url = v;
        }
        if let Some(v) = self.flag(explicit.fail_open, settings::FAIL_OPEN)? {
            proxy.fail_open = v;
        }
        proxy.provider_api_key = self
            .string(
                explicit.provider_api_key.clone().map(|k| k.0),
                settings::PROVIDER_API_KEY,
            )
            .and_then(ApiKey::new);
        if let Some(v) = self.millis(explicit.proxy_timeout, settings::PROXY_TIMEOUT_MS)? {
            proxy.timeout = v;
        }
        if let Some(v) = self.millis(
            explicit.health_probe_interval,
            settings::HEALTH_PROBE_INTERVAL_MS,
        )? {
            proxy.health_probe_interval = v;
        }

        let telemetry = &mut config.telemetry;
        if let Some(v) = self.flag(explicit.telemetry_enabled, settings::TELEMETRY_ENABLED)? {
            telemetry.enabled = v;
        }
        if let Some(v) = self.string(
            explicit.telemetry_endpoint.clone(),
            settings::TELEMETRY_ENDPOINT,
        ) {
            telemetry.endpoint = v;
        }
        if let Some(v) = self.flag(explicit.include_prompts, settings::INCLUDE_PROMPTS)? {
            telemetry.include_prompts = v;
        }
        if let Some(v) = self.sample_rate(explicit.sample_rate)? {
            telemetry.sample_rate = v;
        }
        if let Some(v) = self.count(explicit.buffer_capacity, settings::BUFFER_CAPACITY)? {
            telemetry.buffer_capacity = v;
        }
        if let Some(v) = self.count(explicit.batch_size, settings::BATCH_SIZE)? {
            telemetry.batch_size = v;
        }
        if let Some(v) = self.millis(explicit.flush_interval, settings::FLUSH_INTERVAL_MS)? {
            telemetry.flush_interval = v;
        }
        if let Some(v) = self.count(
            explicit.max_delivery_attempts.map(|n| n as usize),
            settings::MAX_DELIVERY_ATTEMPTS,
        )? {
            telemetry.max_delivery_attempts = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = self.millis(explicit.backoff_initial, settings::BACKOFF_INITIAL_MS)? {
            telemetry.backoff_initial = v;
        }
        if let Some(v) = self.millis(explicit.backoff_max, settings::BACKOFF_MAX_MS)? {
            telemetry.backoff_max = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn string(&self, explicit: Option<String>, name: &'static str) -> Option<String> {
        explicit
            .or_else(|| self.source.get(name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, explicit: Option<bool>, name: &'static str) -> Result<Option<bool>, ConfigError> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        match self.source.get(name) {
            None => Ok(None),
            Some(raw) => parse_bool(&raw).map(Some).ok_or(ConfigError::InvalidValue {
                setting: name,
                value: raw,
                expected: "true/false, 1/0 or yes/no",
            }),
        }
    }

    fn count(
        &self,
        explicit: Option<usize>,
        name: &'static str,
    ) -> Result<Option<usize>, ConfigError> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        match self.source.get(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    setting: name,
                    value: raw,
                    expected: "a non-negative integer",
                }),
        }
    }

    fn millis(
        &self,
        explicit: Option<Duration>,
        name: &'static str,
    ) -> Result<Option<Duration>, ConfigError> {
        if explicit.is_some() {
            return Ok(explicit);
        }
        match self.source.get(name) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|_| ConfigError::InvalidValue {
                    setting: name,
                    value: raw,
                    expected: "a duration in milliseconds",
                }),
        }
    }

    fn sample_rate(&self, explicit: Option<f64>) -> Result<Option<SampleRate>, ConfigError> {
        let raw = match explicit {
            Some(v) => v.to_string(),
            None => match self.source.get(settings::SAMPLE_RATE) {
                Some(v) => v.trim().to_string(),
                None => return Ok(None),
            },
        };
        raw.parse::<f64>()
            .ok()
            .and_then(SampleRate::new)
            .map(Some)
            .ok_or(ConfigError::InvalidSampleRate { value: raw })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
