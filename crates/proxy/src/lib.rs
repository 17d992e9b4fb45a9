//! Skew managed-proxy transport.
//!
//! Forwards an intercepted call to the managed proxy and keeps the cached
//! proxy health flag current.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** URL construction, identification headers, timeouts,
//! HTTP failure classification and the health probe loop live here. The
//! interceptor sees only [`ProxyTransport`] and the shared
//! [`domain::HealthState`].
//!
//! ## Failure classification
//!
//! | Outcome | Error | Fail-open eligible |
//! |---------|-------|--------------------|
//! | connect failure, timeout | [`domain::ProxyError::Unavailable`] | yes |
//! | HTTP 5xx | [`domain::ProxyError::Unavailable`] | yes |
//! | undecodable 2xx body | [`domain::ProxyError::Unavailable`] | yes |
//! | HTTP 4xx | [`domain::ProxyError::Rejected`] | no |

pub mod health;
pub mod transport;

pub use health::HealthProbe;
pub use transport::{
    proxy_url, HttpProxyTransport, ProxyTransport, API_KEY_HEADER, ORG_ID_HEADER,
    PROJECT_ID_HEADER, PROVIDER_KEY_HEADER, REQUEST_ID_HEADER,
};
