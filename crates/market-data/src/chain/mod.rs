//! Option chain derivation.
//!
//! Turns an index, its ATM strike and an expiry into the instrument keys a
//! collection cycle asks the scheduler for:
//!
//! ```text
//! spot ─► atm_strike ─► strike_ladder(offsets) ─► × {CE, PE} ─► NFO:<symbol>
//! ```

mod index;
mod strikes;
mod symbol;

use chrono::NaiveDate;
use rust_decimal::Decimal;

pub use index::{IndexRegistry, IndexSpec};
pub use strikes::{atm_strike, offset_of, strike_ladder};
pub use symbol::{parse_option_symbol, weekly_expiry, OptionContract, OptionSide};

use crate::models::InstrumentKey;

/// Every contract around `atm` for the index's configured offsets, strikes ascending,
/// call before put at each strike.
pub fn option_chain(spec: &IndexSpec, atm: Decimal, expiry: NaiveDate) -> Vec<OptionContract> {
    strike_ladder(atm, spec.strike_step, &spec.offsets)
        .into_iter()
        .flat_map(|strike| {
            OptionSide::BOTH.into_iter().map(move |side| OptionContract {
                index: spec.name.clone(),
                expiry,
                strike,
                side,
            })
        })
        .collect()
}

/// Provider keys for [`option_chain`].
pub fn chain_instrument_keys(
    spec: &IndexSpec,
    atm: Decimal,
    expiry: NaiveDate,
) -> Vec<InstrumentKey> {
    option_chain(spec, atm, expiry)
        .iter()
        .map(|contract| contract.instrument_key(&spec.derivatives_exchange))
        .collect()
}
