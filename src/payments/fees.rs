//! Fee calculation
//!
//! Fees are a percentage of the amount plus a fixed charge. Rates come from the
//! fee schedule (`fees_limits` for regular fees keyed by category and payment
//! method, `fees_express` for express fees keyed by category); when a row is
//! missing a documented per-flow default applies.

use crate::database::repository::FeeScheduleStore;
use crate::error::ReconcileError;
use crate::payments::types::FeeRate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Fee schedule category for payouts
pub const PAYOUT_CATEGORY: i64 = 9;
/// Fee schedule category for payments
pub const PAYMENT_CATEGORY: i64 = 10;
/// Users with this role pay regular payout fees; everyone else pays express
pub const REGULAR_ROLE_ID: i64 = 3;

/// Default payment fee: 5% + 5,000
pub fn payment_fallback() -> FeeRate {
    FeeRate {
        percentage: Decimal::new(5, 0),
        fixed: Decimal::new(5_000, 0),
    }
}

/// Default regular payout fee: 1.5% + 5,000
pub fn payout_regular_fallback() -> FeeRate {
    FeeRate {
        percentage: Decimal::new(15, 1),
        fixed: Decimal::new(5_000, 0),
    }
}

/// Default express payout fee: 1.5% + 7,000
pub fn payout_express_fallback() -> FeeRate {
    FeeRate {
        percentage: Decimal::new(15, 1),
        fixed: Decimal::new(7_000, 0),
    }
}

/// Payout fee tier, derived from the paying user's role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeTier {
    Regular,
    Express,
}

impl FeeTier {
    pub fn for_role(role_id: Option<i64>) -> Self {
        if role_id == Some(REGULAR_ROLE_ID) {
            FeeTier::Regular
        } else {
            FeeTier::Express
        }
    }
}

/// A fee applied to a concrete amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub rate: FeeRate,
    /// `amount * percentage / 100`
    pub percentage_amount: Decimal,
    /// `percentage_amount + fixed`
    pub total: Decimal,
}

impl FeeBreakdown {
    /// `None` when the amount is too large for the rate to be applied
    pub fn compute(rate: FeeRate, amount: Decimal) -> Option<Self> {
        let percentage_amount = amount
            .checked_mul(rate.percentage)?
            .checked_div(Decimal::ONE_HUNDRED)?;
        Some(Self {
            rate,
            percentage_amount,
            total: percentage_amount.checked_add(rate.fixed)?,
        })
    }

    /// Amount left for the merchant once the fee is taken out
    pub fn net_of(&self, amount: Decimal) -> Result<Decimal, ReconcileError> {
        amount
            .checked_sub(self.total)
            .ok_or(ReconcileError::AmountOverflow("net amount"))
    }

    /// Amount plus fee, as debited for a payout
    pub fn gross_of(&self, amount: Decimal) -> Result<Decimal, ReconcileError> {
        amount
            .checked_add(self.total)
            .ok_or(ReconcileError::AmountOverflow("payout debit"))
    }
}

fn apply(rate: FeeRate, amount: Decimal) -> Result<FeeBreakdown, ReconcileError> {
    FeeBreakdown::compute(rate, amount).ok_or(ReconcileError::AmountOverflow("fee"))
}

/// Looks up fee rates and applies them to callback amounts
#[derive(Clone)]
pub struct FeeCalculator {
    schedule: Arc<dyn FeeScheduleStore>,
}

impl FeeCalculator {
    pub fn new(schedule: Arc<dyn FeeScheduleStore>) -> Self {
        Self { schedule }
    }

    /// Fee charged to the merchant on an incoming payment
    pub async fn payment_fee(
        &self,
        payment_method_id: Option<i64>,
        amount: Decimal,
    ) -> Result<FeeBreakdown, ReconcileError> {
        let rate = match payment_method_id {
            Some(method) => self.schedule.regular_fee(PAYMENT_CATEGORY, method).await?,
            None => None,
        };

        let rate = rate.unwrap_or_else(|| {
            debug!(?payment_method_id, "No payment fee row, using default rate");
            payment_fallback()
        });

        apply(rate, amount)
    }

    /// Fee charged to the merchant on a payout, tiered by the user's role
    pub async fn payout_fee(
        &self,
        payment_method_id: Option<i64>,
        tier: FeeTier,
        amount: Decimal,
    ) -> Result<FeeBreakdown, ReconcileError> {
        let rate = match tier {
            FeeTier::Regular => {
                let row = match payment_method_id {
                    Some(method) => self.schedule.regular_fee(PAYOUT_CATEGORY, method).await?,
                    None => None,
                };
                row.unwrap_or_else(payout_regular_fallback)
            }
            FeeTier::Express => self
                .schedule
                .express_fee(PAYOUT_CATEGORY)
                .await?
                .unwrap_or_else(payout_express_fallback),
        };

        apply(rate, amount)
    }
}
