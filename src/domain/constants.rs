// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

// =============================================================================
// BUCKETS
// =============================================================================

/// Width of a block-denominated bucket, in blocks.
pub const BLOCK_BUCKET_SIZE: u64 = 240;
/// Width of a timestamp-denominated bucket, in seconds.
pub const TIMESTAMP_BUCKET_SIZE: u64 = 3_600;

// =============================================================================
// GAS & TRANSACTION CONSTANTS
// =============================================================================

/// Gas budgeted for a `claim()` call when pricing a claim.
pub const CLAIMING_GAS_ESTIMATE: u64 = 100_000;
/// Gas limit attached to claim sends.
pub const CLAIM_GAS_LIMIT: u64 = 120_000;
/// Fixed overhead the scheduler contract burns around the scheduled call.
pub const EXECUTION_GAS_OVERHEAD: u64 = 180_000;

/// Required depth before a receipt is considered final.
pub const CONFIRMATION_BLOCKS: u64 = 12;

// =============================================================================
// NETWORK CONSTANTS
// =============================================================================

pub const CHAIN_ETHEREUM: u64 = 1;
pub const CHAIN_KOVAN: u64 = 42;
pub const CHAIN_ROPSTEN: u64 = 3;

// Block times in seconds (approximate)
pub fn get_block_time(chain_id: u64) -> u64 {
    match chain_id {
        CHAIN_ETHEREUM | CHAIN_ROPSTEN => 12,
        CHAIN_KOVAN => 4,
        _ => 12, // Default
    }
}

/// Execution gas amount for a scheduled call: call gas plus overhead, padded by 1/64
/// for the gas the EVM withholds from nested calls.
pub fn execution_gas_amount(call_gas: u64) -> u64 {
    call_gas
        .saturating_add(EXECUTION_GAS_OVERHEAD)
        .saturating_mul(65)
        / 64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_gas_amount_pads_overhead() {
        assert_eq!(execution_gas_amount(0), 182_812);
        assert_eq!(execution_gas_amount(20_000), 203_125);
    }
}
