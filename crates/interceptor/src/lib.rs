//! Skew call interceptor.
//!
//! Wraps an [`LlmClient`] so that every chat completion and embedding call
//! is timed, optionally routed through the managed proxy, and reported to the
//! control plane, without changing what the caller observes.
//!
//! ```no_run
//! # async fn example<C: domain::LlmClient>(client: C) -> Result<(), domain::SkewError> {
//! use interceptor::{wrap, WrapOptions};
//!
//! let wrapped = wrap(client, WrapOptions::new().with_api_key("sk_live_…"))?;
//! // use `wrapped` exactly where `client` was used
//! # Ok(())
//! # }
//! ```
//!
//! ## Architectural Layer
//!
//! **Facade + control surface.** Sequences the routing decision
//! ([`domain::decide`]), the proxy transport (`proxy` crate) and the
//! telemetry pipeline (`telemetry` crate). It holds no transport code of its
//! own.
//!
//! ## Guarantees
//!
//! - With proxying disabled, return values and errors are the wrapped
//!   client's own, unmodified (errors arrive as [`UpstreamError::Client`]).
//! - Telemetry never blocks, slows or fails a call. A full buffer drops the
//!   newest record.
//! - With `fail_open`, an unreachable proxy costs one failed attempt and the
//!   call is served directly. With `fail_open` off the proxy error is
//!   returned as [`UpstreamError::Proxy`].
//! - If the caller drops a call future, a `Cancelled` record is still
//!   produced.

mod builder;
mod call;
mod engine;
mod wrapper;

pub use builder::{wrap, wrap_with_resolver, WrapBuilder};
pub use wrapper::WrappedClient;

pub use domain::{
    CallOutcome, CallRecord, ConfigError, ConfigResolver, Configuration, ErrorMetadata,
    HealthFlag, LlmClient, MapSettings, PolicyFlags, ProxyError, RequestMetadata,
    ResponseMetadata, RouteReason, RoutedVia, SkewError, UpstreamError, WrapOptions,
};
pub use proxy::ProxyTransport;
pub use telemetry::{PolicyFetchError, PolicySource, TelemetrySink, TelemetryStats};
