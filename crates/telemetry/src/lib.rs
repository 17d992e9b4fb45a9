//! Skew telemetry pipeline.
//!
//! Moves [`domain::CallRecord`]s from the interceptor to the control plane
//! without ever blocking, slowing or failing the host's call.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Buffering, batching, HTTP delivery and retry timing all
//! live here. The interceptor only sees [`EventBuffer::try_push`] and the
//! [`DispatcherHandle`] control methods.
//!
//! ## Flow
//!
//! ```text
//! interceptor ──try_push──▶ EventBuffer ──drain_batch──▶ Dispatcher ──deliver──▶ TelemetrySink
//!                 (never waits)        (bounded, newest-drop)      (retry + backoff)
//! ```
//!
//! The buffer is the only state shared with the calling thread. Every other
//! piece runs on the dispatcher task, so a slow or failing control plane
//! costs the host nothing beyond dropped records.

pub mod backoff;
pub mod buffer;
pub mod dispatcher;
pub mod policy;
pub mod sink;
mod wire;

pub use backoff::Backoff;
pub use buffer::EventBuffer;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherHandle, TelemetryStats};
pub use policy::{HttpPolicyClient, PolicyFetchError, PolicySource};
pub use sink::{HttpTelemetrySink, TelemetrySink, SDK_LANGUAGE, SDK_VERSION};
