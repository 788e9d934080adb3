//! Reservations must survive writes that interleave with them
//!
//! The store below stalls right after an unfiltered output read, which is
//! the window between reconciliation reading the local records and writing
//! them back.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use lightweight_utxo_wallet::{
    chain::{MockChainClient, RemoteUtxo},
    config::{Network, WalletConfig},
    data_structures::{Outpoint, TransactionRecord, WalletOutput},
    errors::{WalletError, WalletResult},
    keys::WalletKey,
    signing::{ActionOutput, CreateActionOptions},
    storage::{MemoryStorage, OutputFilter, TransactionFilter, WalletStorage},
    wallet::{Wallet, WalletBuilder},
};

/// Memory store that pauses once after the next unfiltered `get_outputs`
struct StallingStorage {
    inner: MemoryStorage,
    stall_next_scan: AtomicBool,
}

impl StallingStorage {
    fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            stall_next_scan: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.stall_next_scan.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletStorage for StallingStorage {
    async fn initialize(&self) -> WalletResult<()> {
        self.inner.initialize().await
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    async fn put_output(&self, output: &WalletOutput) -> WalletResult<()> {
        self.inner.put_output(output).await
    }

    async fn put_outputs(&self, outputs: &[WalletOutput]) -> WalletResult<()> {
        self.inner.put_outputs(outputs).await
    }

    async fn get_output(&self, outpoint: &Outpoint) -> WalletResult<Option<WalletOutput>> {
        self.inner.get_output(outpoint).await
    }

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<WalletOutput>> {
        let unfiltered = filter.is_none();
        let outputs = self.inner.get_outputs(filter).await?;
        if unfiltered && self.stall_next_scan.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(outputs)
    }

    async fn delete_output(&self, outpoint: &Outpoint) -> WalletResult<bool> {
        self.inner.delete_output(outpoint).await
    }

    async fn delete_spent_outputs_before(&self, cutoff: u64) -> WalletResult<usize> {
        self.inner.delete_spent_outputs_before(cutoff).await
    }

    async fn put_transaction(&self, record: &TransactionRecord) -> WalletResult<()> {
        self.inner.put_transaction(record).await
    }

    async fn get_transaction(&self, txid: &str) -> WalletResult<Option<TransactionRecord>> {
        self.inner.get_transaction(txid).await
    }

    async fn get_transactions(
        &self,
        filter: Option<TransactionFilter>,
    ) -> WalletResult<Vec<TransactionRecord>> {
        self.inner.get_transactions(filter).await
    }

    async fn rename_transaction(
        &self,
        old_txid: &str,
        record: &TransactionRecord,
    ) -> WalletResult<()> {
        self.inner.rename_transaction(old_txid, record).await
    }

    async fn delete_transaction(&self, txid: &str) -> WalletResult<bool> {
        self.inner.delete_transaction(txid).await
    }

    async fn put_setting(&self, key: &str, value: &str) -> WalletResult<()> {
        self.inner.put_setting(key, value).await
    }

    async fn get_setting(&self, key: &str) -> WalletResult<Option<String>> {
        self.inner.get_setting(key).await
    }

    async fn get_settings(&self) -> WalletResult<HashMap<String, String>> {
        self.inner.get_settings().await
    }

    async fn delete_setting(&self, key: &str) -> WalletResult<bool> {
        self.inner.delete_setting(key).await
    }

    async fn clear_all(&self) -> WalletResult<()> {
        self.inner.clear_all().await
    }
}

fn funding(key: &WalletKey, height: Option<u32>) -> RemoteUtxo {
    RemoteUtxo {
        txid: "01".repeat(32),
        vout: 0,
        satoshis: 10_000,
        locking_script_hex: hex::encode(key.locking_script()),
        block_height: height,
    }
}

fn pay_1000() -> CreateActionOptions {
    CreateActionOptions::new().pay(ActionOutput::to_address(
        WalletKey::generate(Network::Mainnet).address(),
        1_000,
    ))
}

async fn stalling_wallet() -> (Arc<Wallet>, Arc<StallingStorage>, MockChainClient, WalletKey) {
    let chain = MockChainClient::new();
    let key = WalletKey::generate(Network::Mainnet);
    chain.set_utxos(&key.address(), vec![funding(&key, None)]);
    let storage = Arc::new(StallingStorage::new());
    let wallet = WalletBuilder::new()
        .from_wif(key.to_wif())
        .with_config(WalletConfig::default())
        .with_storage(storage.clone())
        .with_chain_client(Arc::new(chain.clone()))
        .build()
        .await
        .unwrap();
    wallet.sync().await.unwrap();
    (Arc::new(wallet), storage, chain, key)
}

#[tokio::test]
async fn test_sync_interleaved_with_create_action_keeps_reservation() {
    let (wallet, storage, chain, key) = stalling_wallet().await;

    // The output gets mined, so the next sync rewrites its record
    chain.set_utxos(&key.address(), vec![funding(&key, Some(100))]);
    storage.arm();

    let syncing = {
        let wallet = wallet.clone();
        tokio::spawn(async move { wallet.sync().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = wallet.create_action(pay_1000()).await.unwrap();
    let report = syncing.await.unwrap().unwrap();
    assert_eq!(report.updated, 1);

    let outpoint = Outpoint::new("01".repeat(32), 0);
    assert_eq!(first.inputs(), vec![outpoint.clone()]);
    let stored = wallet.storage().get_output(&outpoint).await.unwrap().unwrap();
    assert_eq!(stored.reserved_by.as_deref(), Some(first.reference.as_str()));
    assert_eq!(stored.block_height, Some(100));

    // The only output is held by the first action
    assert!(matches!(
        wallet.create_action(pay_1000()).await,
        Err(WalletError::InsufficientFunds { available: 0, .. })
    ));
}

#[tokio::test]
async fn test_label_edit_interleaved_with_sync_keeps_both() {
    let (wallet, storage, chain, key) = stalling_wallet().await;
    let outpoint = Outpoint::new("01".repeat(32), 0);

    chain.set_utxos(&key.address(), vec![funding(&key, Some(100))]);
    storage.arm();

    let syncing = {
        let wallet = wallet.clone();
        tokio::spawn(async move { wallet.sync().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    wallet.utxos().add_label(&outpoint, "savings").await.unwrap();
    syncing.await.unwrap().unwrap();

    let stored = wallet.storage().get_output(&outpoint).await.unwrap().unwrap();
    assert!(stored.labels.contains("savings"));
    assert_eq!(stored.block_height, Some(100));
}
