//! Core domain for the Skew interception layer.
//!
//! This crate contains every value the interceptor, router and telemetry
//! pipeline exchange: identifiers, the configuration snapshot and its
//! resolver, the per-call routing decision, the telemetry record, and the
//! capability traits a wrapped client implements. Infrastructure crates
//! (`proxy`, `telemetry`) implement transports; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `OrgId`, `ApiKey`, …) |
//! | [`types`] | Value types (`TokenUsage`, `TokenCost`, `SampleRate`, `Operation`, …) |
//! | [`errors`] | Error taxonomy and retry policy |
//! | [`config`] | Configuration snapshot, explicit options, resolver, policy flags |
//! | [`routing`] | Proxy health flag and the per-call routing decision |
//! | [`record`] | `CallRecord` and prompt digests |
//! | [`pricing`] | Per-model cost estimation |
//! | [`client`] | `LlmClient` capability trait and metadata accessors |

pub mod client;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod pricing;
pub mod record;
pub mod routing;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use client::{ErrorMetadata, LlmClient, RequestMetadata, ResponseMetadata};
pub use config::{
    defaults, settings, ConfigCell, ConfigResolver, Configuration, EnvSettings, MapSettings, PolicyFlags,
    ProxySettings, SettingsSource, TelemetrySettings, WrapOptions,
};
pub use errors::{
    ConfigError, ProxyError, RetryPolicy, SkewError, TelemetryError, UpstreamError,
};
pub use identifiers::{ApiKey, OrgId, ProjectId, RequestId};
pub use pricing::{estimate_cost, pricing_for_model, ModelPricing};
pub use record::{hash_prompt, CallOutcome, CallRecord, UNKNOWN_MODEL};
pub use routing::{decide, HealthFlag, HealthState, ProxyDecision, RouteReason, RoutedVia};
pub use types::{Operation, SampleRate, Timestamp, TokenCost, TokenCount, TokenUsage};
