//! Monetary display formatting.

use rust_decimal::{Decimal, RoundingStrategy};

/// Render an amount for display.
///
/// Whole amounts print without decimals (`150`), anything else with exactly
/// two (`12.50`, midpoints rounded away from zero). The digits are exact at
/// any magnitude `Decimal` can hold.
pub fn format_amount(amount: Decimal) -> String {
    // Also collapses -0 so a zero total never prints as "-0".
    if amount.is_zero() {
        return "0".to_string();
    }

    if amount.fract().is_zero() {
        amount.trunc().to_string()
    } else {
        let mut cents = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        cents.rescale(2);
        cents.to_string()
    }
}

/// Render an amount prefixed with a currency symbol.
pub fn format_money(symbol: &str, amount: Decimal) -> String {
    format!("{symbol}{}", format_amount(amount))
}
