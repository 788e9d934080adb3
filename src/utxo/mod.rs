//! UTXO manager: reconciliation, selection, balance and reservations
//!
//! Per-output lifecycle:
//!
//! ```text
//! Unspent-Spendable --reserve--> Reserved --release--> Unspent-Spendable
//! Unspent-Spendable / Reserved --mark_spent--> Spent
//! Spent --reappears in provider set (reorg)--> Unspent-Spendable
//! ```
//!
//! Every decision re-reads the store; the manager keeps no cached view.
//! Every read-modify-write of output records (selection, reservation,
//! release, reconciliation, spend marking and labelling) runs under one
//! async mutex, so concurrent actions never share an input and a write
//! never replays a stale copy of a reserved record. Network calls happen
//! before the mutex is taken.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    categorization::{categorize, decoration_for, to_wallet_output, CategorizedOutputs},
    chain::{ChainClient, OrdinalIndexer},
    common::unix_now,
    config::WalletConfig,
    data_structures::{Outpoint, SpentBy, TransactionStatus, WalletOutput},
    errors::{WalletError, WalletResult},
    keys::locking_script_for_address,
    storage::{OutputFilter, TransactionFilter, WalletStorage},
};

pub mod selection;

pub use selection::{select_outputs, Selection, SelectionOptions};

/// Settings key holding the last successful sync time of an address
pub fn last_sync_key(address: &str) -> String {
    format!("sync.{address}.last_sync")
}

/// Settings key holding the chain height seen by the last successful sync
pub fn sync_height_key(address: &str) -> String {
    format!("sync.{address}.height")
}

/// Settings key holding the outpoints the indexer last reported for an address
pub fn decorated_outpoints_key(address: &str) -> String {
    format!("sync.{address}.decorated")
}

/// What one reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub remote_count: usize,
    pub inserted: usize,
    /// Spent records that reappeared in the provider's set
    pub restored: usize,
    pub marked_spent: usize,
    /// Records whose confirmation height changed
    pub updated: usize,
    /// Records left alone because one of our in-flight transactions explains them
    pub skipped_in_flight: usize,
}

impl SyncReport {
    pub fn changes(&self) -> usize {
        self.inserted + self.restored + self.marked_spent + self.updated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: u64,
    pub unconfirmed: u64,
}

impl Balance {
    pub fn total(&self) -> u64 {
        self.confirmed + self.unconfirmed
    }
}

pub struct UtxoManager {
    storage: Arc<dyn WalletStorage>,
    chain: Arc<dyn ChainClient>,
    config: WalletConfig,
    selection_lock: Mutex<()>,
}

impl UtxoManager {
    pub fn new(
        storage: Arc<dyn WalletStorage>,
        chain: Arc<dyn ChainClient>,
        config: WalletConfig,
    ) -> Self {
        Self {
            storage,
            chain,
            config,
            selection_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn WalletStorage> {
        &self.storage
    }

    /// Txids of our own transactions that are out but not yet mined
    async fn in_flight_txids(&self) -> WalletResult<HashSet<String>> {
        Ok(self
            .storage
            .get_transactions(Some(
                TransactionFilter::new().with_status(TransactionStatus::Broadcast),
            ))
            .await?
            .into_iter()
            .map(|t| t.txid)
            .collect())
    }

    /// Reconcile the local records of `address` against the provider's UTXO set
    ///
    /// Network failures propagate; nothing is written in that case.
    pub async fn sync(&self, address: &str) -> WalletResult<SyncReport> {
        let script = locking_script_for_address(address, self.config.network)?;
        let remote = self.chain.fetch_utxos(address).await?;
        let height = self.chain.current_height().await?;

        let _guard = self.selection_lock.lock().await;
        let in_flight = self.in_flight_txids().await?;

        let mut local: HashMap<Outpoint, WalletOutput> = self
            .storage
            .get_outputs(None)
            .await?
            .into_iter()
            .filter(|o| o.locking_script == script)
            .map(|o| (o.outpoint.clone(), o))
            .collect();

        let mut report = SyncReport {
            remote_count: remote.len(),
            ..Default::default()
        };
        let mut changed = Vec::new();
        let mut remote_set = HashSet::with_capacity(remote.len());
        let now = unix_now();

        for utxo in remote {
            let outpoint = Outpoint::new(utxo.txid, utxo.vout);
            remote_set.insert(outpoint.clone());

            match local.remove(&outpoint) {
                None => {
                    let locking_script = if utxo.locking_script_hex.is_empty() {
                        script.clone()
                    } else {
                        hex::decode(&utxo.locking_script_hex)?
                    };
                    changed.push(
                        WalletOutput::new(outpoint, utxo.satoshis, locking_script)
                            .with_block_height(utxo.block_height),
                    );
                    report.inserted += 1;
                }
                Some(mut existing) => {
                    let mut dirty = false;
                    if existing.is_spent() {
                        let spender_in_flight = existing
                            .spent_by
                            .as_ref()
                            .and_then(SpentBy::txid)
                            .is_some_and(|t| in_flight.contains(t));
                        if spender_in_flight {
                            // Provider has not caught up with our broadcast yet
                            report.skipped_in_flight += 1;
                        } else {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(outpoint = %existing.outpoint, "Spent output reappeared, restoring");
                            existing.restore_unspent();
                            report.restored += 1;
                            dirty = true;
                        }
                    }
                    if existing.block_height != utxo.block_height {
                        existing.block_height = utxo.block_height;
                        report.updated += 1;
                        dirty = true;
                    }
                    if dirty {
                        changed.push(existing);
                    }
                }
            }
        }

        // Whatever is left locally was not reported by the provider
        for (_, mut existing) in local {
            if !existing.is_spendable_unspent() || remote_set.contains(&existing.outpoint) {
                continue;
            }
            if in_flight.contains(&existing.outpoint.txid) {
                report.skipped_in_flight += 1;
                continue;
            }
            existing.mark_spent(SpentBy::Unknown, now);
            report.marked_spent += 1;
            changed.push(existing);
        }

        if !changed.is_empty() {
            self.storage.put_outputs(&changed).await?;
        }
        self.storage
            .put_setting(&last_sync_key(address), &now.to_string())
            .await?;
        self.storage
            .put_setting(&sync_height_key(address), &height.to_string())
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            address = %address,
            height,
            remote = report.remote_count,
            inserted = report.inserted,
            restored = report.restored,
            marked_spent = report.marked_spent,
            updated = report.updated,
            "UTXO sync complete"
        );

        Ok(report)
    }

    /// Pull decorated outputs from the indexer and store them non-spendable
    ///
    /// Known plain records that the indexer now reports as assets are demoted.
    /// Decorated records missing from the indexer's set are marked spent.
    pub async fn sync_decorated(
        &self,
        address: &str,
        indexer: &dyn OrdinalIndexer,
    ) -> WalletResult<CategorizedOutputs> {
        let script = locking_script_for_address(address, self.config.network)?;
        let categorized = categorize(&indexer.fetch_decorated_utxos(address).await?);

        let _guard = self.selection_lock.lock().await;
        let previous = self.decorated_outpoints(address).await?;
        let mut changed = Vec::new();
        let mut seen = HashSet::new();
        for utxo in categorized.decorated() {
            let outpoint = Outpoint::new(utxo.txid.clone(), utxo.vout);
            seen.insert(outpoint.clone());
            match self.storage.get_output(&outpoint).await? {
                None => changed.push(to_wallet_output(utxo)?),
                Some(mut existing) => {
                    let decoration = decoration_for(utxo);
                    if existing.decoration != decoration {
                        if let Some(decoration) = decoration {
                            existing = existing.with_decoration(decoration);
                            if existing.reserved_by.take().is_some() {
                                #[cfg(feature = "tracing")]
                                tracing::warn!(outpoint = %existing.outpoint, "Reserved output turned out to carry an asset");
                            }
                            changed.push(existing);
                        }
                    }
                }
            }
        }

        let now = unix_now();
        let stale = self
            .storage
            .get_outputs(Some(OutputFilter::new().unspent().with_decorated(true)))
            .await?;
        for mut existing in stale {
            // Envelope scripts differ from the bare address script, so the
            // indexer's previous listing decides ownership as well
            let ours = existing.locking_script == script || previous.contains(&existing.outpoint);
            if ours && !seen.contains(&existing.outpoint) {
                existing.mark_spent(SpentBy::Unknown, now);
                changed.push(existing);
            }
        }

        if !changed.is_empty() {
            self.storage.put_outputs(&changed).await?;
        }
        let mut listed: Vec<String> = seen.iter().map(ToString::to_string).collect();
        listed.sort();
        self.storage
            .put_setting(
                &decorated_outpoints_key(address),
                &serde_json::to_string(&listed)?,
            )
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            address = %address,
            ordinals = categorized.ordinals.len(),
            token_a = categorized.token_a.len(),
            token_b = categorized.token_b.len(),
            changed = changed.len(),
            "Decorated sync complete"
        );

        Ok(categorized)
    }

    /// Outpoints the indexer reported for `address` on the previous decorated sync
    async fn decorated_outpoints(&self, address: &str) -> WalletResult<HashSet<Outpoint>> {
        let Some(raw) = self
            .storage
            .get_setting(&decorated_outpoints_key(address))
            .await?
        else {
            return Ok(HashSet::new());
        };
        let listed: Vec<String> = serde_json::from_str(&raw)?;
        listed.iter().map(|s| s.parse()).collect()
    }

    fn max_inputs(&self, options: &SelectionOptions) -> usize {
        options
            .max_utxos
            .unwrap_or(self.config.max_inputs_per_tx)
            .min(self.config.max_inputs_per_tx)
    }

    async fn selectable_candidates(&self) -> WalletResult<Vec<WalletOutput>> {
        self.storage
            .get_outputs(Some(OutputFilter::spendable().with_decorated(false)))
            .await
    }

    /// Read-only selection; nothing is reserved
    pub async fn select(&self, target: u64, options: &SelectionOptions) -> WalletResult<Selection> {
        let candidates = self.selectable_candidates().await?;
        select_outputs(candidates, target, options, self.max_inputs(options))
    }

    /// Select and reserve for `reference` under the selection lock
    ///
    /// `amount_for(n)` gives the amount needed when spending `n` inputs, so
    /// the fee can grow with the selection. The input count only grows, so
    /// the loop ends within `max_inputs` rounds.
    pub async fn select_and_reserve<F>(
        &self,
        reference: &str,
        options: &SelectionOptions,
        amount_for: F,
    ) -> WalletResult<Selection>
    where
        F: Fn(usize) -> u64 + Send,
    {
        let _guard = self.selection_lock.lock().await;
        let max_inputs = self.max_inputs(options);
        let candidates = self.selectable_candidates().await?;

        let mut assumed_inputs = 1;
        let selection = loop {
            let selection = select_outputs(
                candidates.clone(),
                amount_for(assumed_inputs),
                options,
                max_inputs,
            )?;
            if selection.len() <= assumed_inputs {
                break selection;
            }
            assumed_inputs = selection.len();
        };

        self.reserve_unlocked(reference, &selection.outputs).await?;
        Ok(selection)
    }

    /// Reserve caller-pinned inputs for `reference`
    ///
    /// Pinned inputs bypass the decoration rule; spent or already reserved
    /// inputs are refused.
    pub async fn reserve_outpoints(
        &self,
        reference: &str,
        outpoints: &[Outpoint],
    ) -> WalletResult<Vec<WalletOutput>> {
        let _guard = self.selection_lock.lock().await;
        let mut outputs = Vec::with_capacity(outpoints.len());
        for outpoint in outpoints {
            let output = self
                .storage
                .get_output(outpoint)
                .await?
                .ok_or_else(|| WalletError::UtxoNotFound(outpoint.clone()))?;
            if output.is_spent() {
                return Err(WalletError::InvalidTransaction(format!(
                    "Input {outpoint} is already spent"
                )));
            }
            if output.is_reserved() {
                return Err(WalletError::InvalidTransaction(format!(
                    "Input {outpoint} is reserved by another action"
                )));
            }
            outputs.push(output);
        }
        self.reserve_unlocked(reference, &outputs).await?;
        Ok(outputs)
    }

    async fn reserve_unlocked(&self, reference: &str, outputs: &[WalletOutput]) -> WalletResult<()> {
        let reserved: Vec<WalletOutput> = outputs
            .iter()
            .cloned()
            .map(|mut o| {
                o.reserved_by = Some(reference.to_string());
                o
            })
            .collect();
        self.storage.put_outputs(&reserved).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(reference = %reference, count = reserved.len(), "Reserved outputs");
        Ok(())
    }

    /// Release every output held by `reference`; returns how many were freed
    pub async fn release_reservation(&self, reference: &str) -> WalletResult<usize> {
        let _guard = self.selection_lock.lock().await;
        let held = self
            .storage
            .get_outputs(Some(OutputFilter::new().reserved_by(reference)))
            .await?;
        let released: Vec<WalletOutput> = held
            .into_iter()
            .map(|mut o| {
                o.reserved_by = None;
                o
            })
            .collect();
        if !released.is_empty() {
            self.storage.put_outputs(&released).await?;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(reference = %reference, count = released.len(), "Released reservation");
        Ok(released.len())
    }

    /// Mark `outpoints` spent by `txid`
    pub async fn mark_spent(&self, outpoints: &[Outpoint], txid: &str) -> WalletResult<()> {
        let _guard = self.selection_lock.lock().await;
        let now = unix_now();
        let mut spent = Vec::with_capacity(outpoints.len());
        for outpoint in outpoints {
            let mut output = self
                .storage
                .get_output(outpoint)
                .await?
                .ok_or_else(|| WalletError::UtxoNotFound(outpoint.clone()))?;
            output.mark_spent(SpentBy::Txid(txid.to_string()), now);
            spent.push(output);
        }
        self.storage.put_outputs(&spent).await
    }

    /// Record outputs our own transaction pays back to the wallet
    pub async fn register_change(&self, outputs: Vec<WalletOutput>) -> WalletResult<()> {
        let _guard = self.selection_lock.lock().await;
        let change: Vec<WalletOutput> = outputs
            .into_iter()
            .map(|o| {
                let mut o = o.as_change();
                o.spendable = !o.is_decorated();
                o
            })
            .collect();
        self.storage.put_outputs(&change).await
    }

    /// Stamp `height` on the unconfirmed outputs created by `txid`
    pub async fn mark_mined(&self, txid: &str, height: u32) -> WalletResult<usize> {
        let _guard = self.selection_lock.lock().await;
        let mined: Vec<WalletOutput> = self
            .storage
            .get_outputs(Some(OutputFilter::new().unconfirmed()))
            .await?
            .into_iter()
            .filter(|o| o.outpoint.txid == txid)
            .map(|mut o| {
                o.block_height = Some(height);
                o
            })
            .collect();
        if !mined.is_empty() {
            self.storage.put_outputs(&mined).await?;
        }
        Ok(mined.len())
    }

    /// Spendable, unspent value split by confirmation
    pub async fn balance(&self) -> WalletResult<Balance> {
        let outputs = self
            .storage
            .get_outputs(Some(OutputFilter::spendable()))
            .await?;
        let mut balance = Balance::default();
        for output in outputs.iter().filter(|o| o.is_spendable_unspent()) {
            if output.is_confirmed() {
                balance.confirmed += output.satoshis;
            } else {
                balance.unconfirmed += output.satoshis;
            }
        }
        Ok(balance)
    }

    /// Sync then report the balance; an unreachable provider leaves the local view
    pub async fn refresh_balance(&self, address: &str) -> WalletResult<Balance> {
        match self.sync(address).await {
            Ok(_) => {}
            Err(e) if e.is_network() => {
                #[cfg(feature = "tracing")]
                tracing::warn!(address = %address, error = %e, "Balance refresh could not reach provider, using local state");
            }
            Err(e) => return Err(e),
        }
        self.balance().await
    }

    async fn update_output<F>(&self, outpoint: &Outpoint, apply: F) -> WalletResult<WalletOutput>
    where
        F: FnOnce(&mut WalletOutput) + Send,
    {
        let _guard = self.selection_lock.lock().await;
        let mut output = self
            .storage
            .get_output(outpoint)
            .await?
            .ok_or_else(|| WalletError::UtxoNotFound(outpoint.clone()))?;
        apply(&mut output);
        self.storage.put_output(&output).await?;
        Ok(output)
    }

    /// Replace the label set of an output
    pub async fn set_labels<I, S>(&self, outpoint: &Outpoint, labels: I) -> WalletResult<WalletOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels.into_iter().map(Into::into).collect();
        self.update_output(outpoint, move |o| o.labels = labels).await
    }

    pub async fn add_label(&self, outpoint: &Outpoint, label: &str) -> WalletResult<WalletOutput> {
        let label = label.to_string();
        self.update_output(outpoint, move |o| {
            o.labels.insert(label);
        })
        .await
    }

    pub async fn set_description(
        &self,
        outpoint: &Outpoint,
        description: Option<String>,
    ) -> WalletResult<WalletOutput> {
        self.update_output(outpoint, move |o| o.description = description)
            .await
    }

    /// Delete spent records older than `older_than`
    pub async fn cleanup_spent(&self, older_than: Duration) -> WalletResult<usize> {
        let cutoff = unix_now().saturating_sub(older_than.as_secs());
        let removed = self.storage.delete_spent_outputs_before(cutoff).await?;
        #[cfg(feature = "tracing")]
        tracing::info!(removed, cutoff, "Cleaned up spent outputs");
        Ok(removed)
    }

    pub async fn list_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<WalletOutput>> {
        self.storage.get_outputs(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::{MockChainClient, RemoteUtxo},
        config::Network,
        data_structures::TransactionRecord,
        keys::WalletKey,
        storage::MemoryStorage,
    };

    struct Fixture {
        manager: UtxoManager,
        chain: MockChainClient,
        storage: Arc<MemoryStorage>,
        address: String,
        script_hex: String,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::initialized().await.unwrap());
        let chain = MockChainClient::new();
        let key = WalletKey::generate(Network::Mainnet);
        let manager = UtxoManager::new(
            storage.clone(),
            Arc::new(chain.clone()),
            WalletConfig::default(),
        );
        Fixture {
            manager,
            chain,
            storage,
            address: key.address(),
            script_hex: hex::encode(key.locking_script()),
        }
    }

    fn remote(f: &Fixture, n: u8, satoshis: u64, height: Option<u32>) -> RemoteUtxo {
        RemoteUtxo {
            txid: format!("{n:02x}").repeat(32),
            vout: 0,
            satoshis,
            locking_script_hex: f.script_hex.clone(),
            block_height: height,
        }
    }

    #[tokio::test]
    async fn test_sync_inserts_and_is_idempotent() {
        let f = fixture().await;
        f.chain.set_utxos(
            &f.address,
            vec![remote(&f, 1, 1000, Some(10)), remote(&f, 2, 500, None)],
        );

        let first = f.manager.sync(&f.address).await.unwrap();
        assert_eq!(first.inserted, 2);

        let second = f.manager.sync(&f.address).await.unwrap();
        assert_eq!(second.changes(), 0);

        let balance = f.manager.balance().await.unwrap();
        assert_eq!(balance.confirmed, 1000);
        assert_eq!(balance.unconfirmed, 500);
        assert!(f
            .storage
            .get_setting(&last_sync_key(&f.address))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_sync_marks_missing_spent_and_reverses_on_reorg() {
        let f = fixture().await;
        f.chain.set_utxos(&f.address, vec![remote(&f, 1, 1000, Some(10))]);
        f.manager.sync(&f.address).await.unwrap();

        f.chain.set_utxos(&f.address, vec![]);
        let report = f.manager.sync(&f.address).await.unwrap();
        assert_eq!(report.marked_spent, 1);
        let outpoint = Outpoint::new("01".repeat(32), 0);
        let stored = f.storage.get_output(&outpoint).await.unwrap().unwrap();
        assert_eq!(stored.spent_by, Some(SpentBy::Unknown));
        assert_eq!(f.manager.balance().await.unwrap().total(), 0);

        f.chain.set_utxos(&f.address, vec![remote(&f, 1, 1000, Some(12))]);
        let report = f.manager.sync(&f.address).await.unwrap();
        assert_eq!(report.restored, 1);
        assert_eq!(report.updated, 1);
        let again = f.manager.sync(&f.address).await.unwrap();
        assert_eq!(again.restored, 0);

        let stored = f.storage.get_output(&outpoint).await.unwrap().unwrap();
        assert!(stored.is_spendable_unspent());
        assert_eq!(stored.block_height, Some(12));
    }

    #[tokio::test]
    async fn test_sync_does_not_undo_in_flight_spend() {
        let f = fixture().await;
        f.chain.set_utxos(&f.address, vec![remote(&f, 1, 1000, Some(10))]);
        f.manager.sync(&f.address).await.unwrap();

        let spender = "ee".repeat(32);
        let mut record = TransactionRecord::pending(spender.clone(), "r".into(), String::new());
        record.transition(TransactionStatus::Broadcast).unwrap();
        f.storage.put_transaction(&record).await.unwrap();
        let outpoint = Outpoint::new("01".repeat(32), 0);
        f.manager.mark_spent(&[outpoint.clone()], &spender).await.unwrap();

        let report = f.manager.sync(&f.address).await.unwrap();
        assert_eq!(report.restored, 0);
        assert_eq!(report.skipped_in_flight, 1);
        assert!(f.storage.get_output(&outpoint).await.unwrap().unwrap().is_spent());
    }

    #[tokio::test]
    async fn test_sync_network_error_propagates_and_refresh_degrades() {
        let f = fixture().await;
        f.chain.set_utxos(&f.address, vec![remote(&f, 1, 1000, Some(10))]);
        f.manager.sync(&f.address).await.unwrap();

        f.chain.set_failure_modes(crate::chain::MockNetworkFailureModes {
            fail_all_reads: true,
            ..Default::default()
        });
        assert!(matches!(
            f.manager.sync(&f.address).await,
            Err(WalletError::NetworkError(_))
        ));
        let balance = f.manager.refresh_balance(&f.address).await.unwrap();
        assert_eq!(balance.total(), 1000);
    }

    #[tokio::test]
    async fn test_select_scenario_and_reservation() {
        let f = fixture().await;
        f.chain.set_utxos(
            &f.address,
            vec![
                remote(&f, 1, 1000, Some(1)),
                remote(&f, 2, 500, Some(1)),
                remote(&f, 3, 200, Some(1)),
            ],
        );
        f.manager.sync(&f.address).await.unwrap();

        let selection = f.manager.select(700, &SelectionOptions::new()).await.unwrap();
        assert_eq!(selection.total, 1000);
        assert_eq!(selection.len(), 1);

        let reserved = f
            .manager
            .select_and_reserve("action-1", &SelectionOptions::new(), |_| 700)
            .await
            .unwrap();
        assert_eq!(reserved.total, 1000);

        // The reserved output is no longer available
        let next = f.manager.select(600, &SelectionOptions::new()).await.unwrap();
        assert_eq!(next.total, 700);

        assert_eq!(f.manager.release_reservation("action-1").await.unwrap(), 1);
        let again = f.manager.select(700, &SelectionOptions::new()).await.unwrap();
        assert_eq!(again.total, 1000);
    }

    #[tokio::test]
    async fn test_select_and_reserve_grows_with_input_count() {
        let f = fixture().await;
        f.chain.set_utxos(
            &f.address,
            (1..=5u8).map(|n| remote(&f, n, 100, Some(1))).collect(),
        );
        f.manager.sync(&f.address).await.unwrap();

        // Each extra input costs 10 more
        let selection = f
            .manager
            .select_and_reserve("grow", &SelectionOptions::new(), |n| 250 + 10 * n as u64)
            .await
            .unwrap();
        assert!(selection.total >= 250 + 10 * selection.len() as u64);
        assert_eq!(selection.len(), 3);
    }

    #[tokio::test]
    async fn test_decorated_sync_retires_envelope_scripts() {
        use crate::chain::{DecoratedUtxo, MockOrdinalIndexer, Origin, OriginData};

        let f = fixture().await;
        let indexer = MockOrdinalIndexer::new();
        // Inscription envelope appended after the address's P2PKH script
        let mut envelope = remote(&f, 7, 1, Some(20));
        envelope.locking_script_hex = format!("{}0063036f7264510a746578742f706c61696e68", f.script_hex);
        let mut inscribed = DecoratedUtxo::plain(envelope);
        inscribed.origin = Some(Origin {
            outpoint: Some(format!("{}_0", "07".repeat(32))),
            data: Some(OriginData {
                inscription: Some(serde_json::json!({ "file": { "type": "text/plain" } })),
                ..Default::default()
            }),
        });
        indexer.set_utxos(&f.address, vec![inscribed]);

        f.manager.sync_decorated(&f.address, &indexer).await.unwrap();
        let outpoint = Outpoint::new("07".repeat(32), 0);
        let stored = f.storage.get_output(&outpoint).await.unwrap().unwrap();
        assert_ne!(hex::encode(&stored.locking_script), f.script_hex);
        assert!(stored.is_decorated() && !stored.is_spent());

        // Transferred away: gone from the indexer's listing
        indexer.set_utxos(&f.address, vec![]);
        f.manager.sync_decorated(&f.address, &indexer).await.unwrap();
        let retired = f.storage.get_output(&outpoint).await.unwrap().unwrap();
        assert!(retired.is_spent());
        assert_eq!(
            f.storage
                .get_setting(&decorated_outpoints_key(&f.address))
                .await
                .unwrap()
                .as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_labels_and_cleanup() {
        let f = fixture().await;
        f.chain.set_utxos(&f.address, vec![remote(&f, 1, 1000, Some(1))]);
        f.manager.sync(&f.address).await.unwrap();
        let outpoint = Outpoint::new("01".repeat(32), 0);

        f.manager.set_labels(&outpoint, ["a"]).await.unwrap();
        let updated = f.manager.add_label(&outpoint, "b").await.unwrap();
        assert_eq!(updated.labels.len(), 2);
        f.manager
            .set_description(&outpoint, Some("rent".into()))
            .await
            .unwrap();
        let listed = f
            .manager
            .list_outputs(Some(OutputFilter::new().with_label("b")))
            .await
            .unwrap();
        assert_eq!(listed[0].description.as_deref(), Some("rent"));

        let missing = Outpoint::new("99".repeat(32), 0);
        assert!(matches!(
            f.manager.add_label(&missing, "x").await,
            Err(WalletError::UtxoNotFound(_))
        ));

        f.manager.mark_spent(&[outpoint.clone()], &"ab".repeat(32)).await.unwrap();
        assert_eq!(f.manager.cleanup_spent(Duration::from_secs(3600)).await.unwrap(), 0);

        let mut old = f.storage.get_output(&outpoint).await.unwrap().unwrap();
        old.spent_at = Some(1);
        f.storage.put_output(&old).await.unwrap();
        assert_eq!(f.manager.cleanup_spent(Duration::from_secs(3600)).await.unwrap(), 1);
        assert!(f.storage.get_output(&outpoint).await.unwrap().is_none());
    }
}
