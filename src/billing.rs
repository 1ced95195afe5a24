//! Billing ledger seam and the flat-rate reference ledger.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::types::{Cost, TokenUsage};

/// Cost estimation, balance checks, and deductions for an organization.
///
/// Deduction failures are an accounting concern, never a conversation one:
/// the observe stage logs them and the round's outcome is unaffected.
#[async_trait]
pub trait BillingLedger: Send + Sync {
    fn estimate_cost(&self, model: &str, usage: &TokenUsage) -> Cost;

    async fn check_balance(&self, org_id: &str, cost: &Cost) -> Result<bool>;

    async fn deduct(&self, org_id: &str, cost: &Cost) -> Result<()>;
}

/// Single-rate ledger with an unlimited balance; records deducted totals.
///
/// Serves tests and deployments that meter usage without enforcing quotas.
#[derive(Debug)]
pub struct FlatRateLedger {
    input_price_per_m: f64,
    output_price_per_m: f64,
    deducted: Mutex<f64>,
}

impl FlatRateLedger {
    pub fn new(input_price_per_m: f64, output_price_per_m: f64) -> Self {
        Self {
            input_price_per_m,
            output_price_per_m,
            deducted: Mutex::new(0.0),
        }
    }

    /// Total amount deducted so far.
    pub fn total_deducted(&self) -> f64 {
        *self.deducted.lock().unwrap()
    }
}

#[async_trait]
impl BillingLedger for FlatRateLedger {
    fn estimate_cost(&self, _model: &str, usage: &TokenUsage) -> Cost {
        Cost::from_usage(usage, self.input_price_per_m, self.output_price_per_m)
    }

    async fn check_balance(&self, _org_id: &str, _cost: &Cost) -> Result<bool> {
        Ok(true)
    }

    async fn deduct(&self, _org_id: &str, cost: &Cost) -> Result<()> {
        *self.deducted.lock().unwrap() += cost.total_cost;
        Ok(())
    }
}

/// Deduct with failures demoted to a warning.
pub(crate) async fn deduct_logged(ledger: &dyn BillingLedger, org_id: &str, cost: &Cost) {
    if let Err(err) = ledger.deduct(org_id, cost).await {
        warn!(org_id, cost = cost.total_cost, error = %err, "billing deduction failed");
    }
}
