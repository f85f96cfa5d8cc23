//! Fixed-point scales and 256-bit intermediate arithmetic
//!
//! All decimal-scale assumptions live here:
//!
//! - every supported asset has [`ASSET_DECIMALS`] (18) decimals; reserves
//!   reporting anything else are refused at registration
//! - the oracle quotes prices in base currency with [`PRICE_DECIMALS`] (8)
//!   decimals
//! - values (amount × price) are normalised by [`VALUE_SCALE`] so they come out
//!   in base currency with 18 decimals
//! - health factors are wads: [`WAD`] represents 1.0
//!
//! Products such as `collateral × price × threshold` do not fit 128 bits for
//! realistic balances, so they are formed in [`U256`] and narrowed back with
//! [`narrow`].

use crate::error::{Error, Result};

// the macro expands to two-parameter `Result`s, so it cannot share a scope
// with the crate alias
mod wide {
    uint::construct_uint! {
        /// 256-bit unsigned integer for intermediate products
        pub struct U256(4);
    }
}

pub use wide::U256;

/// Decimals every registered asset must use
pub const ASSET_DECIMALS: u8 = 18;

/// Decimals of oracle prices
pub const PRICE_DECIMALS: u8 = 8;

/// Divisor turning `amount × price` into an 18-decimal base-currency value
///
/// 10^(ASSET_DECIMALS + PRICE_DECIMALS - 18)
pub const VALUE_SCALE: u128 = 100_000_000;

/// Basis-point denominator (100%)
pub const BPS: u128 = 10_000;

/// 1.0 in 18-decimal fixed point
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// `floor(a * b / denominator)` without intermediate overflow
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(Error::MathOverflow);
    }
    // two 128-bit factors always fit 256 bits
    let product = U256::from(a) * U256::from(b);
    narrow(product / U256::from(denominator))
}

/// Narrow a 256-bit value to 128 bits, failing if it does not fit
pub fn narrow(value: U256) -> Result<u128> {
    if value.bits() > 128 {
        return Err(Error::MathOverflow);
    }
    Ok(value.low_u128())
}

/// Base-currency value (18 decimals) of `amount` at `price`
pub fn value_of(amount: u128, price: u128) -> Result<U256> {
    U256::from(amount)
        .checked_mul(U256::from(price))
        .map(|v| v / U256::from(VALUE_SCALE))
        .ok_or(Error::MathOverflow)
}

/// Base-currency value of `amount` at `price`, weighted by `bps`
pub fn weighted_value_of(amount: u128, price: u128, bps: u16) -> Result<U256> {
    U256::from(amount)
        .checked_mul(U256::from(price))
        .and_then(|v| v.checked_mul(U256::from(bps)))
        .map(|v| v / (U256::from(VALUE_SCALE) * U256::from(BPS)))
        .ok_or(Error::MathOverflow)
}
