//! In-memory storage backend
//!
//! Honors the same contract as the SQLite backend, including the
//! initialization check, so tests and ephemeral sessions exercise identical
//! semantics.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use crate::{
    data_structures::{Outpoint, TransactionRecord, WalletOutput},
    errors::{WalletError, WalletResult},
    storage::{OutputFilter, TransactionFilter, WalletStorage},
};

#[derive(Debug, Default)]
struct MemoryTables {
    outputs: HashMap<Outpoint, WalletOutput>,
    transactions: HashMap<String, TransactionRecord>,
    settings: HashMap<String, String>,
}

/// Memory-only implementation of [`WalletStorage`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<MemoryTables>>,
    initialized: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new, uninitialized store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and initialize in one step
    pub async fn initialized() -> WalletResult<Self> {
        let storage = Self::new();
        storage.initialize().await?;
        Ok(storage)
    }

    fn tables(&self) -> WalletResult<MutexGuard<'_, MemoryTables>> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(WalletError::StoreNotInitialized);
        }
        self.tables
            .lock()
            .map_err(|e| WalletError::StorageError(format!("Memory store poisoned: {e}")))
    }
}

#[async_trait]
impl WalletStorage for MemoryStorage {
    async fn initialize(&self) -> WalletResult<()> {
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn put_output(&self, output: &WalletOutput) -> WalletResult<()> {
        self.tables()?
            .outputs
            .insert(output.outpoint.clone(), output.clone());
        Ok(())
    }

    async fn put_outputs(&self, outputs: &[WalletOutput]) -> WalletResult<()> {
        let mut tables = self.tables()?;
        for output in outputs {
            tables.outputs.insert(output.outpoint.clone(), output.clone());
        }
        Ok(())
    }

    async fn get_output(&self, outpoint: &Outpoint) -> WalletResult<Option<WalletOutput>> {
        Ok(self.tables()?.outputs.get(outpoint).cloned())
    }

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<WalletOutput>> {
        let filter = filter.unwrap_or_default();
        let tables = self.tables()?;
        let mut outputs: Vec<WalletOutput> = tables
            .outputs
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        // Match the SQL backend's ordering
        outputs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.outpoint.cmp(&b.outpoint))
        });
        if let Some(limit) = filter.limit {
            outputs.truncate(limit);
        }
        Ok(outputs)
    }

    async fn delete_output(&self, outpoint: &Outpoint) -> WalletResult<bool> {
        Ok(self.tables()?.outputs.remove(outpoint).is_some())
    }

    async fn delete_spent_outputs_before(&self, cutoff: u64) -> WalletResult<usize> {
        let mut tables = self.tables()?;
        let before = tables.outputs.len();
        tables
            .outputs
            .retain(|_, o| !(o.is_spent() && o.spent_at.is_some_and(|at| at < cutoff)));
        Ok(before - tables.outputs.len())
    }

    async fn put_transaction(&self, record: &TransactionRecord) -> WalletResult<()> {
        self.tables()?
            .transactions
            .insert(record.txid.clone(), record.clone());
        Ok(())
    }

    async fn get_transaction(&self, txid: &str) -> WalletResult<Option<TransactionRecord>> {
        Ok(self.tables()?.transactions.get(txid).cloned())
    }

    async fn get_transactions(
        &self,
        filter: Option<TransactionFilter>,
    ) -> WalletResult<Vec<TransactionRecord>> {
        let filter = filter.unwrap_or_default();
        let tables = self.tables()?;
        let mut records: Vec<TransactionRecord> = tables
            .transactions
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.txid.cmp(&b.txid)));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn rename_transaction(
        &self,
        old_txid: &str,
        record: &TransactionRecord,
    ) -> WalletResult<()> {
        let mut tables = self.tables()?;
        if tables.transactions.remove(old_txid).is_none() {
            return Err(WalletError::StorageError(format!(
                "Transaction {old_txid} not found"
            )));
        }
        tables
            .transactions
            .insert(record.txid.clone(), record.clone());
        Ok(())
    }

    async fn delete_transaction(&self, txid: &str) -> WalletResult<bool> {
        Ok(self.tables()?.transactions.remove(txid).is_some())
    }

    async fn put_setting(&self, key: &str, value: &str) -> WalletResult<()> {
        self.tables()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.tables()?.settings.get(key).cloned())
    }

    async fn get_settings(&self) -> WalletResult<HashMap<String, String>> {
        Ok(self.tables()?.settings.clone())
    }

    async fn delete_setting(&self, key: &str) -> WalletResult<bool> {
        Ok(self.tables()?.settings.remove(key).is_some())
    }

    async fn clear_all(&self) -> WalletResult<()> {
        let mut tables = self.tables()?;
        tables.outputs.clear();
        tables.transactions.clear();
        tables.settings.clear();
        Ok(())
    }
}
