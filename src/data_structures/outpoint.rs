use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::errors::WalletError;

/// Reference to a transaction output: the creating txid plus the output index
///
/// `txid` is kept in display (byte-reversed) hex, the form every chain API
/// returns. It renders as `txid_vout`, the ordinal indexer's outpoint format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: String,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into().to_lowercase(),
            vout,
        }
    }

    /// Txid bytes in internal (wire) order
    pub fn txid_wire_bytes(&self) -> Result<[u8; 32], WalletError> {
        let mut bytes = hex::decode(&self.txid)?;
        if bytes.len() != 32 {
            return Err(WalletError::SerializationError(format!(
                "Invalid txid length: {}",
                bytes.len()
            )));
        }
        bytes.reverse();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}

impl Display for Outpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.txid, self.vout)
    }
}

impl FromStr for Outpoint {
    type Err = WalletError;

    /// Accepts both `txid_vout` and `txid.vout`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .rsplit_once('_')
            .or_else(|| s.rsplit_once('.'))
            .ok_or_else(|| WalletError::InvalidArgument(format!("Invalid outpoint: {s}")))?;
        if txid.len() != 64 || hex::decode(txid).is_err() {
            return Err(WalletError::InvalidArgument(format!(
                "Invalid outpoint txid: {txid}"
            )));
        }
        let vout = vout
            .parse::<u32>()
            .map_err(|e| WalletError::InvalidArgument(format!("Invalid outpoint index: {e}")))?;
        Ok(Outpoint::new(txid, vout))
    }
}
