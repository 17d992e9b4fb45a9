//! Per-model cost estimation.
//!
//! Prices are list prices in USD per one million tokens. The estimate is for
//! dashboards only and is never used to make a routing decision.

use crate::{TokenCost, TokenUsage};

/// Input/output price of one model, USD per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Price per 1M prompt tokens.
    pub input_per_million: f64,
    /// Price per 1M completion tokens.
    pub output_per_million: f64,
}

/// Flat per-token rate applied to models missing from [`MODEL_PRICING`].
pub const UNKNOWN_MODEL_RATE_PER_TOKEN: f64 = 0.000_01;

/// Known model prices.
pub const MODEL_PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o", price(2.5, 10.0)),
    ("gpt-4o-mini", price(0.15, 0.6)),
    ("gpt-4-turbo", price(10.0, 30.0)),
    ("gpt-4", price(30.0, 60.0)),
    ("gpt-3.5-turbo", price(0.5, 1.5)),
    ("o1", price(15.0, 60.0)),
    ("o1-mini", price(3.0, 12.0)),
    ("o3-mini", price(1.1, 4.4)),
    ("text-embedding-3-small", price(0.02, 0.0)),
    ("text-embedding-3-large", price(0.13, 0.0)),
];

const fn price(input_per_million: f64, output_per_million: f64) -> ModelPricing {
    ModelPricing {
        input_per_million,
        output_per_million,
    }
}

/// Looks up the list price for `model`.
///
/// An exact name wins. Otherwise the longest table name followed by `-` is
/// used, so dated snapshots such as `gpt-4o-2024-08-06` price as `gpt-4o`.
pub fn pricing_for_model(model: &str) -> Option<ModelPricing> {
    if let Some((_, pricing)) = MODEL_PRICING.iter().find(|(name, _)| *name == model) {
        return Some(*pricing);
    }
    MODEL_PRICING
        .iter()
        .filter(|(name, _)| {
            model
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('-'))
        })
        .max_by_key(|(name, _)| name.len())
        .map(|(_, pricing)| *pricing)
}

/// Estimates the cost of a call from its token usage.
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> TokenCost {
    let prompt = usage.prompt_tokens.as_u64() as f64;
    let completion = usage.completion_tokens.as_u64() as f64;

    let usd = match pricing_for_model(model) {
        Some(p) => {
            (prompt / 1_000_000.0) * p.input_per_million
                + (completion / 1_000_000.0) * p.output_per_million
        }
        None => (prompt + completion) * UNKNOWN_MODEL_RATE_PER_TOKEN,
    };

    TokenCost::new(usd).unwrap_or_else(TokenCost::zero)
}
