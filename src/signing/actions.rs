//! Action types passed between the build, sign and internalize phases
//!
//! Each phase consumes the previous phase's value, so a built action cannot be
//! internalized unsigned and a signed action cannot be broadcast twice.

use serde::{Deserialize, Serialize};

use super::tx::Transaction;
use crate::{
    data_structures::{Outpoint, TransactionRecord},
    errors::WalletResult,
    utxo::SelectionOptions,
};

/// Where an output pays to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// P2PKH address on the wallet's network
    Address(String),
    /// Raw locking script
    Script(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub satoshis: u64,
    pub target: OutputTarget,
}

impl ActionOutput {
    pub fn to_address(address: impl Into<String>, satoshis: u64) -> Self {
        Self {
            satoshis,
            target: OutputTarget::Address(address.into()),
        }
    }

    pub fn to_script(locking_script: Vec<u8>, satoshis: u64) -> Self {
        Self {
            satoshis,
            target: OutputTarget::Script(locking_script),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateActionOptions {
    pub outputs: Vec<ActionOutput>,
    /// Pinned inputs; selection is skipped when set
    pub inputs: Option<Vec<Outpoint>>,
    /// Defaults to the wallet's own address
    pub change_address: Option<String>,
    /// Defaults to the configured rate
    pub fee_per_kb: Option<u64>,
    pub labels: Vec<String>,
    pub description: Option<String>,
    pub selection: SelectionOptions,
}

impl CreateActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pay(mut self, output: ActionOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<Outpoint>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_change_address(mut self, address: impl Into<String>) -> Self {
        self.change_address = Some(address.into());
        self
    }

    pub fn with_fee_per_kb(mut self, fee_per_kb: u64) -> Self {
        self.fee_per_kb = Some(fee_per_kb);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_selection(mut self, selection: SelectionOptions) -> Self {
        self.selection = selection;
        self
    }
}

/// The change output a built action will produce once broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub vout: u32,
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
    /// Pays the wallet's own script, so it becomes a tracked output
    pub to_wallet: bool,
}

/// Unsigned transaction with its inputs reserved
#[derive(Debug)]
pub struct BuiltAction {
    /// Stable id of the action across the txid change caused by signing
    pub reference: String,
    /// Txid of the unsigned transaction
    pub txid: String,
    pub unsigned_tx: Transaction,
    pub fee: u64,
    pub total_in: u64,
    pub total_out: u64,
    /// `None` when the excess was absorbed into the fee
    pub pending_change: Option<PendingChange>,
}

impl BuiltAction {
    pub fn has_change(&self) -> bool {
        self.pending_change.is_some()
    }

    pub fn inputs(&self) -> Vec<Outpoint> {
        self.unsigned_tx
            .inputs
            .iter()
            .map(|i| i.outpoint.clone())
            .collect()
    }
}

/// Fully signed transaction, ready for broadcast
#[derive(Debug)]
pub struct SignedAction {
    pub reference: String,
    pub txid: String,
    pub signed_tx: Transaction,
    pub raw_tx: Vec<u8>,
    pub fee: u64,
    pub pending_change: Option<PendingChange>,
}

impl SignedAction {
    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw_tx)
    }

    pub fn inputs(&self) -> Vec<Outpoint> {
        self.signed_tx
            .inputs
            .iter()
            .map(|i| i.outpoint.clone())
            .collect()
    }

    /// Rebuild from a stored pending record, e.g. to retry a broadcast whose
    /// outcome was unknown
    pub fn from_record(record: &TransactionRecord, own_script: &[u8]) -> WalletResult<Self> {
        let raw_tx = hex::decode(&record.raw_tx)?;
        let signed_tx = Transaction::deserialize(&raw_tx)?;
        let pending_change = if record.has_change {
            signed_tx
                .outputs
                .iter()
                .enumerate()
                .rev()
                .find(|(_, o)| o.locking_script == own_script)
                .map(|(vout, o)| PendingChange {
                    vout: vout as u32,
                    satoshis: o.satoshis,
                    locking_script: o.locking_script.clone(),
                    to_wallet: true,
                })
        } else {
            None
        };
        Ok(Self {
            reference: record.reference.clone(),
            txid: record.txid.clone(),
            signed_tx,
            raw_tx,
            fee: record.fee,
            pending_change,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalizeResult {
    pub txid: String,
    pub broadcast_log: Vec<String>,
    /// Outputs registered as spendable wallet change
    pub change_outputs: Vec<Outpoint>,
}

/// Outcome of one confirmation polling pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReport {
    pub checked: usize,
    pub confirmed: Vec<String>,
    pub still_unconfirmed: usize,
    /// Provider unreachable for these; state untouched
    pub unknown: usize,
}
