use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use super::{Decoration, Outpoint};
use crate::common::unix_now;

/// Sentinel stored when an output disappeared from the chain view without a
/// known spender
pub const UNKNOWN_SPENDER: &str = "unknown";

/// Who consumed an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpentBy {
    /// Spent by a transaction this wallet knows about
    Txid(String),
    /// Vanished from the provider's UTXO set during reconciliation
    Unknown,
}

impl SpentBy {
    pub fn as_str(&self) -> &str {
        match self {
            SpentBy::Txid(txid) => txid,
            SpentBy::Unknown => UNKNOWN_SPENDER,
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == UNKNOWN_SPENDER {
            SpentBy::Unknown
        } else {
            SpentBy::Txid(value.to_string())
        }
    }

    pub fn txid(&self) -> Option<&str> {
        match self {
            SpentBy::Txid(txid) => Some(txid),
            SpentBy::Unknown => None,
        }
    }
}

impl Display for SpentBy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wallet output tracked by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletOutput {
    pub outpoint: Outpoint,
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
    pub spendable: bool,
    /// Produced by this wallet's own prior transaction
    pub is_change: bool,
    pub labels: BTreeSet<String>,
    pub description: Option<String>,
    /// Unix seconds of first observation
    pub created_at: u64,
    /// `None` while unconfirmed
    pub block_height: Option<u32>,
    pub spent_by: Option<SpentBy>,
    pub spent_at: Option<u64>,
    /// Reference of the in-flight action holding this output
    pub reserved_by: Option<String>,
    pub decoration: Option<Decoration>,
}

impl WalletOutput {
    /// A freshly observed, spendable, undecorated output
    pub fn new(outpoint: Outpoint, satoshis: u64, locking_script: Vec<u8>) -> Self {
        Self {
            outpoint,
            satoshis,
            locking_script,
            spendable: true,
            is_change: false,
            labels: BTreeSet::new(),
            description: None,
            created_at: unix_now(),
            block_height: None,
            spent_by: None,
            spent_at: None,
            reserved_by: None,
            decoration: None,
        }
    }

    pub fn with_block_height(mut self, block_height: Option<u32>) -> Self {
        self.block_height = block_height;
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn as_change(mut self) -> Self {
        self.is_change = true;
        self
    }

    /// Attach a decoration; asset decorations make the output non-spendable
    pub fn with_decoration(mut self, decoration: Decoration) -> Self {
        if decoration.is_asset() {
            self.spendable = false;
        }
        self.decoration = Some(decoration);
        self
    }

    pub fn is_spent(&self) -> bool {
        self.spent_by.is_some()
    }

    pub fn is_decorated(&self) -> bool {
        self.decoration.as_ref().is_some_and(Decoration::is_asset)
    }

    pub fn is_confirmed(&self) -> bool {
        self.block_height.is_some()
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved_by.is_some()
    }

    /// Counts toward the wallet balance
    pub fn is_spendable_unspent(&self) -> bool {
        self.spendable && !self.is_spent()
    }

    /// Eligible for plain-value coin selection
    pub fn is_selectable(&self) -> bool {
        self.is_spendable_unspent() && !self.is_decorated() && !self.is_reserved()
    }

    pub fn has_labels(&self, labels: &[String]) -> bool {
        labels.iter().all(|l| self.labels.contains(l))
    }

    /// Transition to spent; clears any reservation
    pub fn mark_spent(&mut self, spender: SpentBy, at: u64) {
        self.spendable = false;
        self.spent_by = Some(spender);
        self.spent_at = Some(at);
        self.reserved_by = None;
    }

    /// Reorg reversal: the output is back in the provider's UTXO set
    pub fn restore_unspent(&mut self) {
        self.spent_by = None;
        self.spent_at = None;
        self.spendable = !self.is_decorated();
    }

    pub fn locking_script_hex(&self) -> String {
        hex::encode(&self.locking_script)
    }
}
