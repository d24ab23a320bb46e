//! On-chain event shapes, declared with `alloy::sol!` the way `eabz-runic`'s
//! `abis/v4.rs` and the V4 client in the retrieved corpus declare them, plus
//! the V3 Factory/Pool events in the same style.

use alloy::primitives::{keccak256, Address, B256};
use alloy::sol;
use alloy::sol_types::SolValue;

sol! {
    #[derive(Debug)]
    event V4Initialize(bytes32 indexed id, address indexed currency0, address indexed currency1, uint24 fee, int24 tickSpacing, address hooks, uint160 sqrtPriceX96, int24 tick);

    #[derive(Debug)]
    event V4Swap(bytes32 indexed id, address indexed sender, int128 amount0, int128 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick, uint24 fee);

    #[derive(Debug)]
    event V3PoolCreated(address indexed token0, address indexed token1, uint24 indexed fee, int24 tickSpacing, address pool);

    #[derive(Debug)]
    event V3Swap(address indexed sender, address indexed recipient, int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick);
}

/// `keccak256(abi.encode(currency0, currency1, fee, tickSpacing, hooks))`,
/// matching `eabz-runic`'s `utils/pool_id::compute_v4_pool_id`, adapted to
/// operate directly on already-decoded `Address`es.
pub fn compute_v4_pool_id(
    currency0: Address,
    currency1: Address,
    fee: u32,
    tick_spacing: i32,
    hooks: Address,
) -> B256 {
    let (lo, hi) = if currency0 < currency1 {
        (currency0, currency1)
    } else {
        (currency1, currency0)
    };
    let encoded = (lo, hi, fee, tick_spacing, hooks).abi_encode();
    keccak256(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn pool_id_independent_of_input_order() {
        let a = address!("0000000000000000000000000000000000000001");
        let b = address!("0000000000000000000000000000000000000002");
        let id_ab = compute_v4_pool_id(a, b, 3000, 60, Address::ZERO);
        let id_ba = compute_v4_pool_id(b, a, 3000, 60, Address::ZERO);
        assert_eq!(id_ab, id_ba);
    }

    #[test]
    fn different_hooks_change_pool_id() {
        let a = address!("0000000000000000000000000000000000000001");
        let b = address!("0000000000000000000000000000000000000002");
        let hook = address!("00000000000000000000000000000000000099aa");
        let id_no_hook = compute_v4_pool_id(a, b, 3000, 60, Address::ZERO);
        let id_hook = compute_v4_pool_id(a, b, 3000, 60, hook);
        assert_ne!(id_no_hook, id_hook);
    }
}
