//! Per-call routing decision.
//!
//! [`decide`] is a pure function of the configuration snapshot and the cached
//! proxy health flag. It performs no I/O; the flag is kept current by a
//! background probe in the `proxy` crate.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::{Configuration, Operation};

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Last known reachability of the proxy endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthFlag {
    /// No probe has completed yet.
    Unknown,
    /// The last probe succeeded.
    Healthy,
    /// The last probe (or a proxied call) failed.
    Unhealthy,
}

impl HealthFlag {
    fn to_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Healthy => 1,
            Self::Unhealthy => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Healthy,
            2 => Self::Unhealthy,
            _ => Self::Unknown,
        }
    }
}

/// Lock-free cell holding the current [`HealthFlag`].
///
/// Read on every proxied call, written only by the probe task and by the
/// interceptor after a transport failure.
#[derive(Debug)]
pub struct HealthState(AtomicU8);

impl HealthState {
    /// Creates a cell in the [`HealthFlag::Unknown`] state.
    pub fn new() -> Self {
        Self(AtomicU8::new(HealthFlag::Unknown.to_u8()))
    }

    /// Returns the current flag.
    pub fn get(&self) -> HealthFlag {
        HealthFlag::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores a new flag, returning the previous one.
    pub fn set(&self, flag: HealthFlag) -> HealthFlag {
        HealthFlag::from_u8(self.0.swap(flag.to_u8(), Ordering::AcqRel))
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Why a call took the route it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// Proxy routing is disabled in the snapshot.
    ProxyDisabled,
    /// Proxy routing is enabled and the proxy is not known to be down.
    ProxyEnabled,
    /// Proxy routing is enabled but the cached health flag is unhealthy.
    HealthCheckFailed,
    /// The proxied attempt failed and fail-open substituted a direct call.
    ProxyUnavailable,
}

/// Which path served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutedVia {
    /// The wrapped client was invoked directly.
    Direct,
    /// The managed proxy served the call.
    Proxy,
}

/// Ephemeral routing decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyDecision {
    /// Whether to attempt the proxy first.
    pub use_proxy: bool,
    /// Why.
    pub reason: RouteReason,
}

impl ProxyDecision {
    /// Decision to call the client directly.
    pub fn direct(reason: RouteReason) -> Self {
        Self {
            use_proxy: false,
            reason,
        }
    }

    /// Decision to attempt the proxy.
    pub fn proxy() -> Self {
        Self {
            use_proxy: true,
            reason: RouteReason::ProxyEnabled,
        }
    }
}

/// Decides whether `operation` should be attempted through the proxy.
///
/// `Unknown` health is treated as reachable so the first calls after wrapping
/// do not wait for a probe; only a confirmed `Unhealthy` flag skips the proxy.
pub fn decide(_operation: Operation, config: &Configuration, health: HealthFlag) -> ProxyDecision {
    if !config.proxy.enabled {
        return ProxyDecision::direct(RouteReason::ProxyDisabled);
    }
    match health {
        HealthFlag::Unhealthy => ProxyDecision::direct(RouteReason::HealthCheckFailed),
        HealthFlag::Healthy | HealthFlag::Unknown => ProxyDecision::proxy(),
    }
}
