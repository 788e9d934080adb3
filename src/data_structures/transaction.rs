use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use super::Outpoint;
use crate::{
    common::unix_now,
    errors::{WalletError, WalletResult},
};

/// Lifecycle state of a wallet transaction
///
/// `Broadcast` means the relay accepted the transaction; `Confirmed` means it
/// was seen in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending = 0,
    Broadcast = 1,
    Confirmed = 2,
    Failed = 3,
}

impl TransactionStatus {
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Broadcast) | (Pending, Failed) | (Broadcast, Confirmed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Broadcast => "broadcast",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl TryFrom<i64> for TransactionStatus {
    type Error = WalletError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransactionStatus::Pending),
            1 => Ok(TransactionStatus::Broadcast),
            2 => Ok(TransactionStatus::Confirmed),
            3 => Ok(TransactionStatus::Failed),
            other => Err(WalletError::SerializationError(format!(
                "Unknown transaction status {other}"
            ))),
        }
    }
}

/// Merkle inclusion proof as returned by the chain provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleProof {
    pub index: u64,
    pub tx_or_id: String,
    /// Block hash the proof commits to
    pub target: String,
    pub nodes: Vec<String>,
}

/// A transaction this wallet built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: String,
    /// Stable across the txid change that signing causes
    pub reference: String,
    pub raw_tx: String,
    pub status: TransactionStatus,
    /// Change in wallet value caused by this transaction
    pub net_satoshis: i64,
    pub fee: u64,
    pub block_height: Option<u32>,
    pub block_hash: Option<String>,
    pub timestamp: u64,
    pub labels: BTreeSet<String>,
    pub description: Option<String>,
    pub inputs: Vec<Outpoint>,
    pub has_change: bool,
    /// Provider message when broadcast failed
    pub error: Option<String>,
    pub merkle_proof: Option<MerkleProof>,
}

impl TransactionRecord {
    pub fn pending(txid: String, reference: String, raw_tx: String) -> Self {
        Self {
            txid,
            reference,
            raw_tx,
            status: TransactionStatus::Pending,
            net_satoshis: 0,
            fee: 0,
            block_height: None,
            block_hash: None,
            timestamp: unix_now(),
            labels: BTreeSet::new(),
            description: None,
            inputs: Vec::new(),
            has_change: false,
            error: None,
            merkle_proof: None,
        }
    }

    /// Move to `next`, refusing non-monotonic transitions
    pub fn transition(&mut self, next: TransactionStatus) -> WalletResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(WalletError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Broadcast));
        assert!(Pending.can_transition_to(Failed));
        assert!(Broadcast.can_transition_to(Confirmed));

        assert!(!Broadcast.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Broadcast));
        assert!(!Confirmed.can_transition_to(Broadcast));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_record_transition_errors() {
        let mut record = TransactionRecord::pending("aa".into(), "r".into(), String::new());
        record.transition(TransactionStatus::Failed).unwrap();
        let err = record.transition(TransactionStatus::Broadcast).unwrap_err();
        assert!(matches!(
            err,
            WalletError::InvalidStateTransition {
                from: TransactionStatus::Failed,
                to: TransactionStatus::Broadcast
            }
        ));
        assert_eq!(record.status, TransactionStatus::Failed);
    }

    #[test]
    fn test_status_from_db() {
        assert_eq!(
            TransactionStatus::try_from(2).unwrap(),
            TransactionStatus::Confirmed
        );
        assert!(TransactionStatus::try_from(9).is_err());
    }
}
