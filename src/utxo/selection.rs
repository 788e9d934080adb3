//! Largest-first coin selection
//!
//! A simple greedy selector: optionally change outputs first, then by value
//! descending, accumulating until the target is covered. It makes no claim
//! to minimal waste or privacy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{
    data_structures::WalletOutput,
    errors::{WalletError, WalletResult},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOptions {
    /// Every label here must be present on a candidate
    pub labels: Vec<String>,
    pub exclude_txids: BTreeSet<String>,
    pub prefer_change: bool,
    /// Overrides the configured `max_inputs_per_tx`
    pub max_utxos: Option<usize>,
}

impl SelectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn exclude_txid(mut self, txid: impl Into<String>) -> Self {
        self.exclude_txids.insert(txid.into().to_lowercase());
        self
    }

    pub fn prefer_change(mut self, prefer: bool) -> Self {
        self.prefer_change = prefer;
        self
    }

    pub fn with_max_utxos(mut self, max: usize) -> Self {
        self.max_utxos = Some(max);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub outputs: Vec<WalletOutput>,
    pub total: u64,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Select from `candidates` until `target` is covered
///
/// Candidates that are not selectable (spent, reserved, decorated,
/// non-spendable) or fail the label and txid filters are skipped.
pub fn select_outputs(
    candidates: Vec<WalletOutput>,
    target: u64,
    options: &SelectionOptions,
    max_inputs: usize,
) -> WalletResult<Selection> {
    let mut eligible: Vec<WalletOutput> = candidates
        .into_iter()
        .filter(|o| o.is_selectable())
        .filter(|o| o.has_labels(&options.labels))
        .filter(|o| !options.exclude_txids.contains(&o.outpoint.txid))
        .collect();

    // Stable order among equals so repeated selections agree
    eligible.sort_by(|a, b| {
        let change_rank = if options.prefer_change {
            b.is_change.cmp(&a.is_change)
        } else {
            std::cmp::Ordering::Equal
        };
        change_rank
            .then_with(|| b.satoshis.cmp(&a.satoshis))
            .then_with(|| a.outpoint.cmp(&b.outpoint))
    });

    let mut selection = Selection::default();
    if target == 0 {
        return Ok(selection);
    }

    for output in eligible.into_iter().take(max_inputs) {
        selection.total += output.satoshis;
        selection.outputs.push(output);
        if selection.total >= target {
            return Ok(selection);
        }
    }

    Err(WalletError::InsufficientFunds {
        needed: target,
        available: selection.total,
    })
}
