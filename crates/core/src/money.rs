//! Monetary rounding rules.
//!
//! Every monetary figure produced by the engine goes through [`round_money`]
//! exactly once, at the point where it is computed.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places carried by monetary values.
pub const MONEY_SCALE: u32 = 2;

/// Round to [`MONEY_SCALE`] places, half away from zero (2.345 -> 2.35, -2.345 -> -2.35).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × rate_percent / 100`, rounded as money.
pub fn percent_of(amount: Decimal, rate_percent: Decimal) -> Decimal {
    round_money(amount * rate_percent / Decimal::ONE_HUNDRED)
}
