//! Deterministic chain and indexer implementations for tests
//!
//! State is shared behind `Arc<Mutex<..>>` so a test can keep a handle to the
//! mock after handing a clone to the wallet and mutate the "chain" mid-test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ChainClient, DecoratedUtxo, OrdinalIndexer, RemoteUtxo, TxInfo};
use crate::{
    crypto::sha256d,
    data_structures::MerkleProof,
    errors::{WalletError, WalletResult},
};

/// How the mock answers `broadcast`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BroadcastMode {
    /// Accept and echo the computed txid
    #[default]
    Accept,
    /// Relay rejects with this reason
    Reject(String),
    /// Transport failure, outcome unknown
    NetworkFailure,
}

#[derive(Debug, Clone, Default)]
pub struct MockNetworkFailureModes {
    /// Fail the next fetch_utxos call
    pub fail_fetch_utxos: bool,
    /// Fail the next fetch_transaction call
    pub fail_fetch_transaction: bool,
    /// Fail every read until cleared
    pub fail_all_reads: bool,
    /// Return this error from the next call of any kind
    pub next_error_message: Option<String>,
}

#[derive(Debug, Default)]
struct MockChainState {
    utxos: HashMap<String, Vec<RemoteUtxo>>,
    tx_info: HashMap<String, TxInfo>,
    raw_txs: HashMap<String, Vec<u8>>,
    proofs: HashMap<String, MerkleProof>,
    height: u32,
    broadcast_mode: BroadcastMode,
    failure_modes: MockNetworkFailureModes,
    broadcasts: Vec<Vec<u8>>,
}

/// Mock chain provider for deterministic testing
#[derive(Debug, Clone)]
pub struct MockChainClient {
    state: Arc<Mutex<MockChainState>>,
    network_delay: Duration,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Txid of raw transaction bytes in display (reversed) hex
fn display_txid(raw_tx: &[u8]) -> String {
    let mut hash = sha256d(raw_tx);
    hash.reverse();
    hex::encode(hash)
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockChainState {
                height: 800_000,
                ..Default::default()
            })),
            network_delay: Duration::from_millis(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the UTXO set of an address
    pub fn set_utxos(&self, address: &str, utxos: Vec<RemoteUtxo>) {
        self.state().utxos.insert(address.to_string(), utxos);
    }

    pub fn add_utxo(&self, address: &str, utxo: RemoteUtxo) {
        self.state()
            .utxos
            .entry(address.to_string())
            .or_default()
            .push(utxo);
    }

    /// Drop an outpoint from the address's UTXO set, as if it was spent
    pub fn remove_utxo(&self, address: &str, txid: &str, vout: u32) {
        if let Some(list) = self.state().utxos.get_mut(address) {
            list.retain(|u| !(u.txid == txid && u.vout == vout));
        }
    }

    pub fn set_tx_info(&self, info: TxInfo) {
        self.state().tx_info.insert(info.txid.clone(), info);
    }

    /// Record a transaction as mined at `height`
    pub fn mine(&self, txid: &str, height: u32) {
        let mut state = self.state();
        let tip = state.height.max(height);
        state.height = tip;
        state.tx_info.insert(
            txid.to_string(),
            TxInfo {
                txid: txid.to_string(),
                block_height: Some(height),
                block_hash: Some(format!("{height:064x}")),
                confirmations: Some(tip - height + 1),
            },
        );
    }

    pub fn set_raw_transaction(&self, txid: &str, raw_tx: Vec<u8>) {
        self.state().raw_txs.insert(txid.to_string(), raw_tx);
    }

    pub fn set_merkle_proof(&self, txid: &str, proof: MerkleProof) {
        self.state().proofs.insert(txid.to_string(), proof);
    }

    pub fn set_height(&self, height: u32) {
        self.state().height = height;
    }

    pub fn set_broadcast_mode(&self, mode: BroadcastMode) {
        self.state().broadcast_mode = mode;
    }

    pub fn set_failure_modes(&self, modes: MockNetworkFailureModes) {
        self.state().failure_modes = modes;
    }

    /// Every raw transaction submitted, accepted or not
    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.state().broadcasts.clone()
    }

    pub fn set_network_delay(&mut self, delay: Duration) {
        self.network_delay = delay;
    }

    /// Reset the mock to an empty chain
    pub fn reset(&self) {
        *self.state() = MockChainState {
            height: 800_000,
            ..Default::default()
        };
    }

    async fn check_failure(&self, operation: &str) -> WalletResult<()> {
        if !self.network_delay.is_zero() {
            tokio::time::sleep(self.network_delay).await;
        }

        let mut state = self.state();
        let modes = &mut state.failure_modes;

        if let Some(error_msg) = modes.next_error_message.take() {
            return Err(WalletError::NetworkError(error_msg));
        }

        match operation {
            "broadcast" => Ok(()),
            _ if modes.fail_all_reads => Err(WalletError::NetworkError(format!(
                "Mock failure: {operation}"
            ))),
            "fetch_utxos" if modes.fail_fetch_utxos => {
                modes.fail_fetch_utxos = false;
                Err(WalletError::NetworkError(
                    "Mock failure: fetch_utxos".to_string(),
                ))
            }
            "fetch_transaction" if modes.fail_fetch_transaction => {
                modes.fail_fetch_transaction = false;
                Err(WalletError::NetworkError(
                    "Mock failure: fetch_transaction".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn fetch_utxos(&self, address: &str) -> WalletResult<Vec<RemoteUtxo>> {
        self.check_failure("fetch_utxos").await?;
        Ok(self.state().utxos.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_transaction(&self, txid: &str) -> WalletResult<Option<TxInfo>> {
        self.check_failure("fetch_transaction").await?;
        Ok(self.state().tx_info.get(txid).cloned())
    }

    async fn fetch_raw_transaction(&self, txid: &str) -> WalletResult<Option<Vec<u8>>> {
        self.check_failure("fetch_raw_transaction").await?;
        Ok(self.state().raw_txs.get(txid).cloned())
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> WalletResult<String> {
        self.check_failure("broadcast").await?;

        let mut state = self.state();
        state.broadcasts.push(raw_tx.to_vec());
        match state.broadcast_mode.clone() {
            BroadcastMode::Accept => {
                let txid = display_txid(raw_tx);
                state.raw_txs.insert(txid.clone(), raw_tx.to_vec());
                state.tx_info.insert(
                    txid.clone(),
                    TxInfo {
                        txid: txid.clone(),
                        block_height: None,
                        block_hash: None,
                        confirmations: Some(0),
                    },
                );
                Ok(txid)
            }
            BroadcastMode::Reject(reason) => Err(WalletError::BroadcastFailed(reason)),
            BroadcastMode::NetworkFailure => Err(WalletError::NetworkError(
                "Mock failure: broadcast connection reset".to_string(),
            )),
        }
    }

    async fn fetch_merkle_proof(&self, txid: &str) -> WalletResult<Option<MerkleProof>> {
        self.check_failure("fetch_merkle_proof").await?;
        Ok(self.state().proofs.get(txid).cloned())
    }

    async fn current_height(&self) -> WalletResult<u32> {
        self.check_failure("current_height").await?;
        Ok(self.state().height)
    }
}

/// Mock ordinal indexer keyed by address
#[derive(Debug, Clone, Default)]
pub struct MockOrdinalIndexer {
    utxos: Arc<Mutex<HashMap<String, Vec<DecoratedUtxo>>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockOrdinalIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_utxos(&self, address: &str, utxos: Vec<DecoratedUtxo>) {
        self.utxos
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(address.to_string(), utxos);
    }

    /// Make every call fail with a network error until cleared
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = failing;
    }
}

#[async_trait]
impl OrdinalIndexer for MockOrdinalIndexer {
    async fn fetch_decorated_utxos(&self, address: &str) -> WalletResult<Vec<DecoratedUtxo>> {
        if *self.fail.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) {
            return Err(WalletError::NetworkError(
                "Mock failure: fetch_decorated_utxos".to_string(),
            ));
        }
        Ok(self
            .utxos
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}
