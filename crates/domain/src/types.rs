//! Shared value types for the interception domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! values with invariants (sample rates are in `[0.0, 1.0]`, costs are
//! non-negative) and take part in computations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The finite set of client call sites the interceptor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Chat completion (`chat.completions.create`).
    ChatCompletion,
    /// Embedding creation (`embeddings.create`).
    Embedding,
}

impl Operation {
    /// Endpoint label reported to the control plane.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::ChatCompletion => "chat.completions",
            Self::Embedding => "embeddings",
        }
    }

    /// Path appended to the proxy base URL.
    pub fn proxy_path(self) -> &'static str {
        match self {
            Self::ChatCompletion => "chat/completions",
            Self::Embedding => "embeddings",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

// ---------------------------------------------------------------------------
// Token and cost types
// ---------------------------------------------------------------------------

/// Number of tokens consumed by an LLM API call.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

/// Token usage reported in a response's metadata.
///
/// `total` is taken from the provider when reported, otherwise it is the sum
/// of prompt and completion tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Tokens in the prompt / input.
    pub prompt_tokens: TokenCount,
    /// Tokens generated in the completion.
    pub completion_tokens: TokenCount,
    /// Total tokens billed.
    pub total_tokens: TokenCount,
}

impl TokenUsage {
    /// Builds a usage value, deriving the total when the provider omitted it.
    pub fn new(prompt: u64, completion: u64, total: Option<u64>) -> Self {
        let prompt_tokens = TokenCount::new(prompt);
        let completion_tokens = TokenCount::new(completion);
        let total_tokens = match total {
            Some(t) if t > 0 => TokenCount::new(t),
            _ => prompt_tokens + completion_tokens,
        };
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

// ---------------------------------------------------------------------------

/// Monetary cost of LLM token usage, expressed in US dollars.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCost(f64);

impl TokenCost {
    /// Creates a [`TokenCost`] from a raw float value (USD).
    ///
    /// Returns `None` if `value` is negative, infinite, or NaN.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && value >= 0.0 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`TokenCost`] of exactly zero.
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Returns the underlying `f64` value (USD).
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` if this cost is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl std::fmt::Display for TokenCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:.6}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Fraction of calls for which a telemetry record is produced, in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleRate(f64);

impl SampleRate {
    /// Every call is sampled.
    pub const ALWAYS: Self = Self(1.0);

    /// No call is sampled.
    pub const NEVER: Self = Self(0.0);

    /// Creates a [`SampleRate`], returning `None` if `value` is outside
    /// `[0.0, 1.0]` or not finite.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Returns the rate as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` if a uniform draw in `[0.0, 1.0)` selects the call.
    ///
    /// A rate of `0.0` never selects; a rate of `1.0` always does.
    pub fn admits(self, draw: f64) -> bool {
        draw < self.0
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_rate_bounds() {
        assert!(SampleRate::new(-0.1).is_none());
        assert!(SampleRate::new(1.01).is_none());
        assert!(SampleRate::new(f64::NAN).is_none());
        assert_eq!(SampleRate::new(0.25).unwrap().as_f64(), 0.25);
    }

    #[test]
    fn zero_rate_never_admits_and_full_rate_always_does() {
        for draw in [0.0, 0.000_001, 0.5, 0.999_999] {
            assert!(!SampleRate::NEVER.admits(draw));
            assert!(SampleRate::ALWAYS.admits(draw));
        }
    }

    #[test]
    fn usage_derives_missing_total() {
        let usage = TokenUsage::new(10, 5, None);
        assert_eq!(usage.total_tokens.as_u64(), 15);

        let reported = TokenUsage::new(10, 5, Some(20));
        assert_eq!(reported.total_tokens.as_u64(), 20);
    }

    #[test]
    fn token_cost_rejects_negative_and_nan() {
        assert!(TokenCost::new(-1.0).is_none());
        assert!(TokenCost::new(f64::INFINITY).is_none());
        assert!(TokenCost::zero().is_zero());
    }

    #[test]
    fn operation_paths() {
        assert_eq!(Operation::ChatCompletion.endpoint(), "chat.completions");
        assert_eq!(Operation::ChatCompletion.proxy_path(), "chat/completions");
        assert_eq!(Operation::Embedding.proxy_path(), "embeddings");
    }
}
