//! Token usage and cost types.

use serde::{Deserialize, Serialize};

/// Token usage for a single model call or a reconciled round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Estimated cost for a round.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub currency: String,
}

impl Cost {
    /// Compute cost from usage and per-million-token pricing.
    pub fn from_usage(usage: &TokenUsage, input_price_per_m: f64, output_price_per_m: f64) -> Self {
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * input_price_per_m;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * output_price_per_m;
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
            currency: "USD".to_string(),
        }
    }
}
