//! One-shot bytecode safety scan. Pure CPU work over already-fetched bytes,
//! never suspends once the code is in hand.

use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;

use crate::chain::HttpProvider;
use crate::types::BytecodeSafety;

/// 4-byte selectors covering mint, blacklist, fee/tax/max-tx setters,
/// pausable-transfer, and common owner-only mutators. Selectors are
/// `keccak256(signature)[0..4]`; listed as the literal bytes to avoid a
/// runtime hash computation for a fixed, known set.
const DANGEROUS_SELECTORS: &[([u8; 4], &str)] = &[
    ([0x40, 0xc1, 0x0f, 0x19], "mint(address,uint256)"),
    ([0xa0, 0x71, 0x2d, 0x68], "mint(uint256)"),
    ([0xf9, 0xf9, 0x2b, 0xe4], "blacklist(address)"),
    ([0xe4, 0x75, 0x8a, 0x04], "setBlacklist(address,bool)"),
    ([0x1a, 0x7b, 0x21, 0x41], "setTax(uint256)"),
    ([0x69, 0xfe, 0x0e, 0x2d], "setFee(uint256,uint256)"),
    ([0x8a, 0x8c, 0x53, 0x43], "setMaxTx(uint256)"),
    ([0x3f, 0x4b, 0xa8, 0x3a], "unpause()"),
    ([0x8d, 0x8b, 0x1d, 0xb0], "excludeFromFee(address)"),
];

/// `DELEGATECALL` opcode.
const OP_DELEGATECALL: u8 = 0xF4;
/// `JUMP`/`JUMPI` opcodes: a `delegatecall` that sits inside an immediate
/// jump prologue (within the contract's first few instructions) is treated
/// as a proxy-delegation pattern.
const OP_JUMP: u8 = 0x56;
const OP_JUMPI: u8 = 0x57;
const PROLOGUE_WINDOW: usize = 32;

/// Fetches `address`'s deployed bytecode once and returns a verdict.
/// Empty bytecode (EOA or undeployed contract) is `Unsafe`: a pool can't
/// have a legitimate counterpart token with no code.
pub async fn scan(provider: &HttpProvider, address: Address) -> eyre::Result<BytecodeSafety> {
    let code = provider.get_code_at(address).await?;
    Ok(scan_bytecode(&code))
}

pub fn scan_bytecode(code: &Bytes) -> BytecodeSafety {
    if code.is_empty() {
        return BytecodeSafety::Unsafe;
    }
    if contains_dangerous_selector(code) || has_delegatecall_prologue(code) {
        return BytecodeSafety::Unsafe;
    }
    BytecodeSafety::Safe
}

fn contains_dangerous_selector(code: &[u8]) -> bool {
    DANGEROUS_SELECTORS
        .iter()
        .any(|(selector, _)| code.windows(4).any(|w| w == selector))
}

fn has_delegatecall_prologue(code: &[u8]) -> bool {
    let window = &code[..code.len().min(PROLOGUE_WINDOW)];
    let has_delegatecall = window.contains(&OP_DELEGATECALL);
    let has_jump = window.contains(&OP_JUMP) || window.contains(&OP_JUMPI);
    has_delegatecall && has_jump
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bytecode_is_unsafe() {
        assert_eq!(scan_bytecode(&Bytes::new()), BytecodeSafety::Unsafe);
    }

    #[test]
    fn mint_selector_is_unsafe() {
        let mut code = vec![0x60, 0x80, 0x60, 0x40]; // plausible prologue noise
        code.extend_from_slice(&[0x40, 0xc1, 0x0f, 0x19]); // mint(address,uint256)
        code.extend_from_slice(&[0x00; 16]);
        assert_eq!(scan_bytecode(&Bytes::from(code)), BytecodeSafety::Unsafe);
    }

    #[test]
    fn delegatecall_without_jump_is_not_flagged_as_proxy() {
        let mut code = vec![0x60u8, 0x00u8].repeat(10);
        code.push(OP_DELEGATECALL);
        assert_eq!(scan_bytecode(&Bytes::from(code)), BytecodeSafety::Safe);
    }

    #[test]
    fn delegatecall_with_jump_in_prologue_is_unsafe() {
        let mut code = vec![0x60, 0x00, 0x60, 0x00];
        code.push(OP_DELEGATECALL);
        code.push(OP_JUMP);
        assert_eq!(scan_bytecode(&Bytes::from(code)), BytecodeSafety::Unsafe);
    }

    #[test]
    fn plain_bytecode_with_no_patterns_is_safe() {
        let code = vec![0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15];
        assert_eq!(scan_bytecode(&Bytes::from(code)), BytecodeSafety::Safe);
    }
}
