//! Monetary rounding.
//!
//! Amounts are `rust_decimal::Decimal` in reais. Intermediate products keep full
//! precision; values that appear on a document or a report are rounded to
//! centavos with the regime's rounding mode.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of decimal places printed on NFe monetary fields.
pub const CURRENCY_SCALE: u32 = 2;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round half to even (ABNT NBR 5891).
    #[default]
    HalfEven,
    /// Round half away from zero.
    HalfUp,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

/// Round to centavos.
pub fn round_currency(value: Decimal, mode: RoundingMode) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, mode.strategy())
}
