//! Size-based fee estimation
//!
//! Sizes are fixed P2PKH averages. Real signed sizes differ by a few bytes
//! per input (DER signature length varies), which the rate tolerates.

use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

pub const TX_OVERHEAD_BYTES: u64 = 10;
pub const P2PKH_INPUT_BYTES: u64 = 148;
pub const P2PKH_OUTPUT_BYTES: u64 = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeModel {
    /// Satoshis per 1000 bytes
    pub fee_per_kb: u64,
}

impl FeeModel {
    pub fn new(fee_per_kb: u64) -> Self {
        Self { fee_per_kb }
    }

    pub fn estimate_size(inputs: usize, outputs: usize) -> u64 {
        TX_OVERHEAD_BYTES
            .saturating_add(P2PKH_INPUT_BYTES.saturating_mul(inputs as u64))
            .saturating_add(P2PKH_OUTPUT_BYTES.saturating_mul(outputs as u64))
    }

    /// `ceil(size / 1000) * fee_per_kb`; a rate that overflows is refused
    pub fn fee_for_size(&self, size: u64) -> WalletResult<u64> {
        size.div_ceil(1000)
            .checked_mul(self.fee_per_kb)
            .ok_or_else(|| {
                WalletError::InvalidArgument(format!(
                    "Fee for {size} bytes at {} sat/kB overflows",
                    self.fee_per_kb
                ))
            })
    }

    pub fn estimate_fee(&self, inputs: usize, outputs: usize) -> WalletResult<u64> {
        self.fee_for_size(Self::estimate_size(inputs, outputs))
    }
}
