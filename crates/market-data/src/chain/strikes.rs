use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a spot price to the nearest listed strike. Ties round away from zero.
pub fn atm_strike(spot: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return spot;
    }
    (spot / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

/// Strikes at `atm + offset * step`, ascending and de-duplicated.
///
/// Offsets that would land on a non-positive strike are dropped.
pub fn strike_ladder(atm: Decimal, step: Decimal, offsets: &[i32]) -> Vec<Decimal> {
    let mut strikes: Vec<Decimal> = offsets
        .iter()
        .map(|offset| atm + Decimal::from(*offset) * step)
        .filter(|strike| *strike > Decimal::ZERO)
        .map(|strike| strike.normalize())
        .collect();
    strikes.sort();
    strikes.dedup();
    strikes
}

/// Whole steps between a strike and the ATM strike (truncated toward zero).
pub fn offset_of(strike: Decimal, atm: Decimal, step: Decimal) -> i32 {
    if step.is_zero() {
        return 0;
    }
    ((strike - atm) / step).trunc().to_i32().unwrap_or(0)
}
