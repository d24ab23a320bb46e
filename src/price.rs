//! Derives USD mcap and liquidity from a pool's `sqrtPriceX96` and reported
//! liquidity, generalizing the teacher's `UniswapV3::calculate_price` (same
//! float-via-string conversion to sidestep `U256` overflow in the squaring
//! step) to both token sides and both pool generations.
//!
//! These are order-of-magnitude estimates, not reserve computations: exact
//! market-cap accounting would need the token's real circulating supply and
//! full-range liquidity math, neither of which is available from a single
//! pool event. The `min(|amount0|,|amount1|)` native-notional heuristic used
//! for swap USD attribution is documented here rather than silently assumed
//! correct.

use alloy::primitives::U256;

/// Assumed circulating supply used for the mcap estimate. Most new ERC-20
/// launches mint a fixed 1e9 supply at deploy time; without reading the
/// token's actual `totalSupply` this is the best available stand-in.
pub const ASSUMED_SUPPLY: f64 = 1e9;

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

/// Price of token1 in terms of token0, from `sqrtPriceX96`, adjusted for
/// decimals. Mirrors the teacher's `UniswapV3::calculate_price`.
pub fn price_token1_per_token0(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    let q96 = u256_to_f64(U256::from(2).pow(U256::from(96)));
    let sqrt_price_f = u256_to_f64(sqrt_price_x96) / q96;
    let raw_price = sqrt_price_f * sqrt_price_f;
    let decimal_adjustment = 10f64.powi(decimals0 as i32 - decimals1 as i32);
    raw_price * decimal_adjustment
}

/// Estimated fully-diluted USD market cap at pool initialization: token
/// price in native terms times the current native-token USD price, times
/// the assumed supply.
pub fn estimate_mcap_usd(
    sqrt_price_x96: U256,
    token_is_token0: bool,
    token_decimals: u8,
    native_decimals: u8,
    native_usd_price: f64,
) -> f64 {
    let token_price_in_native = if token_is_token0 {
        // token is token0, native (quote) is token1: price of token0 in token1.
        let token1_per_token0 = price_token1_per_token0(sqrt_price_x96, token_decimals, native_decimals);
        if token1_per_token0 == 0.0 {
            0.0
        } else {
            token1_per_token0
        }
    } else {
        let token1_per_token0 = price_token1_per_token0(sqrt_price_x96, native_decimals, token_decimals);
        if token1_per_token0 == 0.0 {
            0.0
        } else {
            1.0 / token1_per_token0
        }
    };
    token_price_in_native * native_usd_price * ASSUMED_SUPPLY
}

/// Approximate USD liquidity from a pool's reported concentrated-liquidity
/// value `L` and current `sqrtPriceX96`, assuming the bulk of `L` sits
/// within range (the full-range approximation `reserve_native ~=
/// L / sqrtPrice`, doubled for both sides). A rough order-of-magnitude
/// estimate, not a reserve computation.
pub fn estimate_liquidity_usd(liquidity: u128, sqrt_price_x96: U256, native_usd_price: f64) -> f64 {
    if liquidity == 0 || native_usd_price <= 0.0 {
        return 0.0;
    }
    let q96 = u256_to_f64(U256::from(2).pow(U256::from(96)));
    let sqrt_price_f = u256_to_f64(sqrt_price_x96) / q96;
    if sqrt_price_f <= 0.0 {
        return 0.0;
    }
    let native_reserve_estimate = (liquidity as f64) / sqrt_price_f / 1e18;
    2.0 * native_reserve_estimate * native_usd_price
}

/// The smaller absolute amount as the native-side notional. Only correct
/// when one side of the swap is the quote asset, which holds here because
/// every tracked pool is required to pair against WETH on one side.
pub fn native_notional(amount0_abs: U256, amount1_abs: U256) -> U256 {
    std::cmp::min(amount0_abs, amount1_abs)
}

/// Converts the unsigned magnitude of a signed on-chain amount (V4's
/// `int128`, V3's `int256`) to `U256` via its decimal `Display`, sidestepping
/// a width-specific `From` impl. Same trick `price_token1_per_token0` uses
/// to avoid `U256` overflow in the squaring step.
pub fn abs_decimal(magnitude: impl std::fmt::Display) -> U256 {
    magnitude.to_string().parse().unwrap_or(U256::ZERO)
}

/// USD value of a swap's native-side notional: `min(|amount0|, |amount1|)`
/// converted from wei to whole units, times the current native-token USD
/// price.
pub fn native_notional_usd(amount0_abs: U256, amount1_abs: U256, native_usd_price: f64) -> f64 {
    let notional = native_notional(amount0_abs, amount1_abs);
    u256_to_f64(notional) / 1e18 * native_usd_price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_round_trips_for_equal_decimals() {
        // sqrtPriceX96 for price=1.0: sqrt(1) * 2^96 = 2^96
        let sqrt_price = U256::from(2).pow(U256::from(96));
        let price = price_token1_per_token0(sqrt_price, 18, 18);
        assert!((price - 1.0).abs() < 1e-6);
    }

    #[test]
    fn native_notional_picks_smaller_amount() {
        let a = U256::from(100u64);
        let b = U256::from(40u64);
        assert_eq!(native_notional(a, b), b);
    }

    #[test]
    fn zero_liquidity_yields_zero_usd() {
        let sqrt_price = U256::from(2).pow(U256::from(96));
        assert_eq!(estimate_liquidity_usd(0, sqrt_price, 3000.0), 0.0);
    }

    #[test]
    fn native_notional_usd_uses_smaller_side_in_whole_units() {
        let one_eth = U256::from(10u64).pow(U256::from(18));
        let more_tokens = U256::from(10u64).pow(U256::from(24));
        assert_eq!(native_notional_usd(one_eth, more_tokens, 3000.0), 3000.0);
    }
}
