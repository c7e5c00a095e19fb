//! Membership discount and tax.
//!
//! Every monetary rounding in the crate goes through [`round_money`].

use crate::models::{Customer, LedgerTotals, Membership};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// Round half-up to two decimal places.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Percentage discount on labor for premium members. Never touches materials.
#[derive(Debug, Clone)]
pub struct DiscountPolicy {
    premium_labor_rate: Decimal,
}

impl DiscountPolicy {
    pub fn new(premium_labor_rate: Decimal) -> Self {
        Self { premium_labor_rate }
    }

    /// Rate that applies to a membership tier.
    pub fn rate_for(&self, membership: Membership) -> Decimal {
        match membership {
            Membership::Premium => self.premium_labor_rate,
            Membership::Standard => Decimal::ZERO,
        }
    }

    pub fn apply(&self, customer: &Customer, labor_total: Decimal) -> Decimal {
        round_money(labor_total.saturating_mul(self.rate_for(customer.membership)))
    }
}

/// Single fixed-rate tax on the discounted subtotal.
#[derive(Debug, Clone)]
pub struct TaxCalculator {
    rate: Decimal,
}

impl TaxCalculator {
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn compute_tax(&self, subtotal: Decimal) -> Decimal {
        round_money(subtotal.saturating_mul(self.rate))
    }
}

/// Figures derived from ledger totals for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub materials_total: Decimal,
    pub labor_total: Decimal,
    pub discount: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub grand_total: Decimal,
}

/// Apply discount then tax to ledger totals. Figures beyond the decimal
/// range saturate instead of failing.
pub fn price(
    totals: &LedgerTotals,
    customer: &Customer,
    discount: &DiscountPolicy,
    tax: &TaxCalculator,
) -> PriceBreakdown {
    let discount_amount = discount.apply(customer, totals.labor_total);
    let subtotal = totals
        .materials_total
        .saturating_add(totals.labor_total)
        .saturating_sub(discount_amount);
    let tax_amount = tax.compute_tax(subtotal);

    PriceBreakdown {
        materials_total: totals.materials_total,
        labor_total: totals.labor_total,
        discount: discount_amount,
        subtotal,
        tax: tax_amount,
        grand_total: subtotal.saturating_add(tax_amount),
    }
}
