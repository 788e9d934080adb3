//! Storage trait definition for wallet persistence
//!
//! This module defines the `WalletStorage` trait: a key-indexed durable store
//! for three record families (outputs keyed by outpoint, transactions keyed by
//! txid, settings keyed by string). Every call is individually atomic and must
//! fail with [`WalletError::StoreNotInitialized`](crate::errors::WalletError)
//! until `initialize()` has run.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::{
    data_structures::{Outpoint, TransactionRecord, TransactionStatus, WalletOutput},
    errors::WalletResult,
};

/// Query filters for retrieving outputs
#[derive(Debug, Clone, Default)]
pub struct OutputFilter {
    /// Filter by the spendable flag
    pub spendable: Option<bool>,
    /// Only outputs without a spender
    pub unspent_only: bool,
    /// Only outputs without a block height
    pub unconfirmed_only: bool,
    /// Only outputs with a block height
    pub confirmed_only: bool,
    /// Filter by presence of an asset decoration
    pub decorated: Option<bool>,
    /// Filter by reservation
    pub reserved_by: Option<String>,
    /// Output must carry this label
    pub label: Option<String>,
    /// Limit number of results
    pub limit: Option<usize>,
}

impl OutputFilter {
    /// Create a new empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Spendable outputs that have not been spent
    pub fn spendable() -> Self {
        Self {
            spendable: Some(true),
            unspent_only: true,
            ..Self::default()
        }
    }

    pub fn with_spendable(mut self, spendable: bool) -> Self {
        self.spendable = Some(spendable);
        self
    }

    pub fn unspent(mut self) -> Self {
        self.unspent_only = true;
        self
    }

    pub fn unconfirmed(mut self) -> Self {
        self.unconfirmed_only = true;
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed_only = true;
        self
    }

    pub fn with_decorated(mut self, decorated: bool) -> Self {
        self.decorated = Some(decorated);
        self
    }

    pub fn reserved_by(mut self, reference: impl Into<String>) -> Self {
        self.reserved_by = Some(reference.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// In-memory evaluation, shared by backends that cannot push the filter down
    pub fn matches(&self, output: &WalletOutput) -> bool {
        if let Some(spendable) = self.spendable {
            if output.spendable != spendable {
                return false;
            }
        }
        if self.unspent_only && output.is_spent() {
            return false;
        }
        if self.unconfirmed_only && output.block_height.is_some() {
            return false;
        }
        if self.confirmed_only && output.block_height.is_none() {
            return false;
        }
        if let Some(decorated) = self.decorated {
            if output.is_decorated() != decorated {
                return false;
            }
        }
        if let Some(reference) = &self.reserved_by {
            if output.reserved_by.as_deref() != Some(reference.as_str()) {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if !output.labels.contains(label) {
                return false;
            }
        }
        true
    }
}

/// Query filters for retrieving transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Filter by transaction status
    pub status: Option<TransactionStatus>,
    /// Filter by action reference
    pub reference: Option<String>,
    /// Limit number of results
    pub limit: Option<usize>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(reference) = &self.reference {
            if &record.reference != reference {
                return false;
            }
        }
        true
    }
}

/// Trait for wallet storage backends
#[async_trait]
pub trait WalletStorage: Send + Sync {
    /// Initialize the storage backend (create tables, indexes, etc.)
    async fn initialize(&self) -> WalletResult<()>;

    /// Whether `initialize()` has completed
    fn is_initialized(&self) -> bool;

    // === Output Methods ===

    /// Insert or replace an output
    async fn put_output(&self, output: &WalletOutput) -> WalletResult<()>;

    /// Insert or replace several outputs in one atomic batch
    async fn put_outputs(&self, outputs: &[WalletOutput]) -> WalletResult<()>;

    /// Get an output by outpoint
    async fn get_output(&self, outpoint: &Outpoint) -> WalletResult<Option<WalletOutput>>;

    /// Get outputs with optional filtering
    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<WalletOutput>>;

    /// Delete an output, returning whether it existed
    async fn delete_output(&self, outpoint: &Outpoint) -> WalletResult<bool>;

    /// Delete spent outputs whose `spent_at` is older than `cutoff` (unix seconds)
    async fn delete_spent_outputs_before(&self, cutoff: u64) -> WalletResult<usize>;

    // === Transaction Methods ===

    /// Insert or replace a transaction record
    async fn put_transaction(&self, record: &TransactionRecord) -> WalletResult<()>;

    /// Get a transaction record by txid
    async fn get_transaction(&self, txid: &str) -> WalletResult<Option<TransactionRecord>>;

    /// Get transaction records with optional filtering
    async fn get_transactions(
        &self,
        filter: Option<TransactionFilter>,
    ) -> WalletResult<Vec<TransactionRecord>>;

    /// Move a record to a new txid key (signing changes the txid)
    async fn rename_transaction(&self, old_txid: &str, record: &TransactionRecord)
        -> WalletResult<()>;

    /// Delete a transaction record
    async fn delete_transaction(&self, txid: &str) -> WalletResult<bool>;

    // === Settings Methods ===

    async fn put_setting(&self, key: &str, value: &str) -> WalletResult<()>;

    async fn get_setting(&self, key: &str) -> WalletResult<Option<String>>;

    async fn get_settings(&self) -> WalletResult<HashMap<String, String>>;

    async fn delete_setting(&self, key: &str) -> WalletResult<bool>;

    /// Remove every record (wallet reset)
    async fn clear_all(&self) -> WalletResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{Decoration, SpentBy};

    fn output(sats: u64) -> WalletOutput {
        WalletOutput::new(Outpoint::new("aa".repeat(32), sats as u32), sats, vec![])
    }

    #[test]
    fn test_spendable_filter() {
        let filter = OutputFilter::spendable();
        let mut o = output(10);
        assert!(filter.matches(&o));
        o.mark_spent(SpentBy::Unknown, 1);
        assert!(!filter.matches(&o));
    }

    #[test]
    fn test_confirmation_filters() {
        let unconfirmed = output(10);
        let confirmed = output(11).with_block_height(Some(800_000));
        assert!(OutputFilter::new().unconfirmed().matches(&unconfirmed));
        assert!(!OutputFilter::new().unconfirmed().matches(&confirmed));
        assert!(OutputFilter::new().confirmed().matches(&confirmed));
    }

    #[test]
    fn test_decoration_and_label_filters() {
        let plain = output(10).with_labels(["savings"]);
        let ordinal = output(1).with_decoration(Decoration::Origin {
            origin: Outpoint::new("bb".repeat(32), 0),
        });
        assert!(OutputFilter::new().with_decorated(false).matches(&plain));
        assert!(OutputFilter::new().with_decorated(true).matches(&ordinal));
        assert!(OutputFilter::new().with_label("savings").matches(&plain));
        assert!(!OutputFilter::new().with_label("savings").matches(&ordinal));
    }
}
