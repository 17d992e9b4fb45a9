//! Error and retry-policy types for the interception domain.
//!
//! Only two families ever reach the host application:
//!
//! - [`UpstreamError`]: the error the wrapped client (or, with fail-closed
//!   proxying, the proxy) produced for a call.
//! - [`SkewError::Configuration`]: raised by `wrap` when the configuration
//!   cannot be resolved.
//!
//! [`ProxyError`] and [`TelemetryError`] are internal. A proxy error only
//! surfaces wrapped in [`UpstreamError::Proxy`] when fail-open is disabled;
//! telemetry errors are always absorbed and at most logged.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by [`TelemetryError::retry_policy`] so the dispatcher can decide
/// whether a failed batch goes back for another attempt or is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Host-visible errors
// ---------------------------------------------------------------------------

/// Errors returned by the wrapping entry points.
#[derive(Debug, Error)]
pub enum SkewError {
    /// The configuration could not be resolved. Wrapping is aborted; the
    /// caller still owns the unwrapped client.
    #[error("Configuration error: {source}")]
    Configuration {
        /// The specific configuration problem.
        #[from]
        source: ConfigError,
    },
}

/// A configuration value is missing or invalid.
///
/// Produced at resolve time; a wrapper never starts with an invalid snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required credential was not supplied by any source.
    #[error("missing required setting '{setting}'")]
    MissingCredential {
        /// Name of the setting (e.g. `SKEW_API_KEY`).
        setting: &'static str,
    },

    /// The sample rate is not a finite number in `[0.0, 1.0]`.
    #[error("invalid sample rate '{value}': must be between 0.0 and 1.0")]
    InvalidSampleRate {
        /// The rejected raw value.
        value: String,
    },

    /// A URL setting is malformed or uses an unsupported scheme.
    #[error("invalid URL for '{setting}' ('{url}'): {reason}")]
    InvalidUrl {
        /// Name of the setting.
        setting: &'static str,
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting could not be parsed into the expected type or range.
    #[error("invalid value '{value}' for '{setting}': expected {expected}")]
    InvalidValue {
        /// Name of the setting.
        setting: &'static str,
        /// The rejected raw value.
        value: String,
        /// Human-readable description of the accepted values.
        expected: &'static str,
    },

    /// The HTTP stack shared by the proxy and telemetry transports could not
    /// be initialised (for example, no TLS backend).
    #[error("HTTP client could not be initialised: {reason}")]
    HttpClient {
        /// Underlying failure.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Upstream errors
// ---------------------------------------------------------------------------

/// The error a caller sees from a wrapped call.
///
/// With proxying disabled this is always [`UpstreamError::Client`] carrying
/// the wrapped client's error value untouched.
#[derive(Debug, Error)]
pub enum UpstreamError<E>
where
    E: std::error::Error + 'static,
{
    /// The wrapped client's own error, passed through unchanged.
    #[error(transparent)]
    Client(E),

    /// The proxy failed and fail-open was disabled (or the proxy rejected
    /// the request outright).
    #[error("proxy error: {0}")]
    Proxy(#[source] ProxyError),
}

impl<E> UpstreamError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the wrapped client's error, if this is one.
    pub fn as_client(&self) -> Option<&E> {
        match self {
            Self::Client(e) => Some(e),
            Self::Proxy(_) => None,
        }
    }

    /// Consumes the error, returning the wrapped client's error if present.
    pub fn into_client(self) -> Option<E> {
        match self {
            Self::Client(e) => Some(e),
            Self::Proxy(_) => None,
        }
    }

    /// Returns the proxy error, if this is one.
    pub fn as_proxy(&self) -> Option<&ProxyError> {
        match self {
            Self::Client(_) => None,
            Self::Proxy(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal errors
// ---------------------------------------------------------------------------

/// A proxied call did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    /// The proxy could not be reached or did not answer usefully (connect
    /// failure, timeout, 5xx, undecodable body). Eligible for fail-open.
    #[error("proxy unavailable at {url}: {reason}")]
    Unavailable {
        /// URL that was called.
        url: String,
        /// Description of the transport failure.
        reason: String,
        /// `true` when the failure was a timeout.
        timed_out: bool,
    },

    /// The proxy answered with a client-error status (4xx). This reflects a
    /// decision about the request itself, so it is never retried directly.
    #[error("proxy rejected request with HTTP {status}: {message}")]
    Rejected {
        /// HTTP status code returned by the proxy.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },
}

impl ProxyError {
    /// Returns `true` if a fail-open configuration may substitute a direct call.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns `true` if the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Unavailable { timed_out: true, .. })
    }
}

/// Failures inside the telemetry pipeline. Never surfaced to the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    /// The buffer was at capacity and the newest record was dropped.
    #[error("telemetry buffer full (capacity {capacity})")]
    BufferFull {
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// The control plane could not be reached or returned a non-success status.
    #[error("telemetry delivery failed: {reason}")]
    Delivery {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Description of the failure.
        reason: String,
        /// Server-requested delay (`Retry-After`), if any.
        retry_after: Option<Duration>,
    },

    /// A batch could not be serialised.
    #[error("telemetry serialisation failed: {0}")]
    Serialization(String),
}

impl TelemetryError {
    /// Classifies the error for the dispatcher's retry loop.
    ///
    /// Transport failures, 408, 429 and 5xx are retryable; other 4xx statuses
    /// and serialisation failures are not, since resending the same batch
    /// cannot succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Delivery {
                status,
                retry_after,
                ..
            } => match status {
                None => RetryPolicy::Retryable { after: *retry_after },
                Some(408 | 429) => RetryPolicy::Retryable { after: *retry_after },
                Some(s) if *s >= 500 => RetryPolicy::Retryable { after: *retry_after },
                Some(_) => RetryPolicy::NonRetryable,
            },
            Self::BufferFull { .. } | Self::Serialization(_) => RetryPolicy::NonRetryable,
        }
    }
}
