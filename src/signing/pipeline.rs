//! Build, sign and internalize transactions against the wallet's state
//!
//! The only moment outputs change hands is inside [`ActionPipeline::internalize_action`],
//! and only after the provider has accepted the broadcast. Until then the
//! inputs are merely reserved, and every failure path releases them.

use std::sync::Arc;

use super::{
    actions::{
        ActionOutput, BuiltAction, ConfirmationReport, CreateActionOptions, InternalizeResult,
        OutputTarget, PendingChange, SignedAction,
    },
    fee::FeeModel,
    sighash::{sign_p2pkh_inputs, PrevOut},
    tx::{txid_of, Transaction, TxIn, TxOut},
};
use crate::{
    chain::ChainClient,
    config::WalletConfig,
    data_structures::{Outpoint, TransactionRecord, TransactionStatus, WalletOutput},
    errors::{WalletError, WalletResult},
    keys::{locking_script_for_address, WalletKey},
    storage::{TransactionFilter, WalletStorage},
    utxo::UtxoManager,
};

/// Random id linking an action's reservations and its transaction record
pub fn new_reference() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

pub struct ActionPipeline {
    utxos: Arc<UtxoManager>,
    storage: Arc<dyn WalletStorage>,
    chain: Arc<dyn ChainClient>,
    key: Arc<WalletKey>,
    config: WalletConfig,
}

impl ActionPipeline {
    pub fn new(
        utxos: Arc<UtxoManager>,
        storage: Arc<dyn WalletStorage>,
        chain: Arc<dyn ChainClient>,
        key: Arc<WalletKey>,
        config: WalletConfig,
    ) -> Self {
        Self {
            utxos,
            storage,
            chain,
            key,
            config,
        }
    }

    fn resolve_output(&self, output: &ActionOutput) -> WalletResult<TxOut> {
        if output.satoshis < self.config.dust_limit {
            return Err(WalletError::InvalidTransaction(format!(
                "Output of {} sats is below the dust limit of {}",
                output.satoshis, self.config.dust_limit
            )));
        }
        let script = match &output.target {
            OutputTarget::Address(address) => {
                locking_script_for_address(address, self.config.network)?
            }
            OutputTarget::Script(script) if script.is_empty() => {
                return Err(WalletError::InvalidTransaction(
                    "Output has an empty locking script".to_string(),
                ))
            }
            OutputTarget::Script(script) => script.clone(),
        };
        Ok(TxOut::new(output.satoshis, script))
    }

    /// Build an unsigned transaction and persist it as `Pending`
    ///
    /// Inputs are pinned or selected and then reserved under the action's
    /// reference. Fee is `ceil(size/1000) * fee_per_kb`; change below the
    /// configured threshold is left to the fee, so
    /// `total_in == total_out + fee` always holds.
    pub async fn create_action(&self, options: CreateActionOptions) -> WalletResult<BuiltAction> {
        if options.outputs.is_empty() {
            return Err(WalletError::InvalidTransaction(
                "Transaction has no outputs".to_string(),
            ));
        }
        let outputs = options
            .outputs
            .iter()
            .map(|o| self.resolve_output(o))
            .collect::<WalletResult<Vec<_>>>()?;
        let total_out = outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.satoshis))
            .ok_or_else(|| WalletError::InvalidTransaction("Output total overflows".to_string()))?;

        let fee_per_kb = options.fee_per_kb.unwrap_or(self.config.fee_per_kb);
        if fee_per_kb == 0 {
            return Err(WalletError::InvalidArgument(
                "Fee rate must be positive".to_string(),
            ));
        }
        let fee_model = FeeModel::new(fee_per_kb);
        // Largest fee selection can ask for; later estimates cannot overflow below it
        fee_model.estimate_fee(self.config.max_inputs_per_tx, outputs.len() + 1)?;
        let change_script = match &options.change_address {
            Some(address) => locking_script_for_address(address, self.config.network)?,
            None => self.key.locking_script(),
        };

        let reference = new_reference();
        let output_count = outputs.len();
        let inputs = match &options.inputs {
            Some(pinned) if pinned.is_empty() => {
                return Err(WalletError::InvalidTransaction(
                    "Transaction has no inputs".to_string(),
                ))
            }
            Some(pinned) => self.utxos.reserve_outpoints(&reference, pinned).await?,
            None => {
                self.utxos
                    .select_and_reserve(&reference, &options.selection, |n| {
                        fee_model
                            .estimate_fee(n, output_count)
                            .map_or(u64::MAX, |fee| total_out.saturating_add(fee))
                    })
                    .await?
                    .outputs
            }
        };

        match self
            .assemble(&reference, &options, inputs, outputs, total_out, fee_model, change_script)
            .await
        {
            Ok(action) => Ok(action),
            Err(e) => {
                self.utxos.release_reservation(&reference).await?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn assemble(
        &self,
        reference: &str,
        options: &CreateActionOptions,
        inputs: Vec<WalletOutput>,
        mut outputs: Vec<TxOut>,
        total_out: u64,
        fee_model: FeeModel,
        change_script: Vec<u8>,
    ) -> WalletResult<BuiltAction> {
        let total_in: u64 = inputs.iter().map(|o| o.satoshis).sum();
        let base_fee = fee_model.estimate_fee(inputs.len(), outputs.len())?;
        let needed = total_out.saturating_add(base_fee);
        if total_in < needed {
            return Err(WalletError::InsufficientFunds {
                needed,
                available: total_in,
            });
        }

        let fee_with_change = fee_model.estimate_fee(inputs.len(), outputs.len() + 1)?;
        let change = total_in
            .checked_sub(total_out.saturating_add(fee_with_change))
            .unwrap_or(0);

        let pending_change = if change > 0 && change >= self.config.change_threshold {
            let vout = outputs.len() as u32;
            outputs.push(TxOut::new(change, change_script.clone()));
            Some(PendingChange {
                vout,
                satoshis: change,
                to_wallet: change_script == self.key.locking_script(),
                locking_script: change_script,
            })
        } else {
            None
        };
        let fee = total_in - total_out - pending_change.as_ref().map_or(0, |c| c.satoshis);

        let mut tx = Transaction::new();
        tx.inputs = inputs
            .iter()
            .map(|o| TxIn::unsigned(o.outpoint.clone()))
            .collect();
        tx.outputs = outputs;
        let txid = tx.txid()?;

        let own_script = self.key.locking_script();
        let own_out: u64 = tx
            .outputs
            .iter()
            .filter(|o| o.locking_script == own_script)
            .map(|o| o.satoshis)
            .sum();

        let mut record = TransactionRecord::pending(txid.clone(), reference.to_string(), tx.to_hex()?);
        record.fee = fee;
        record.net_satoshis = own_out as i64 - total_in as i64;
        record.inputs = tx.inputs.iter().map(|i| i.outpoint.clone()).collect();
        record.has_change = pending_change.is_some();
        record.labels = self
            .config
            .default_labels
            .iter()
            .chain(options.labels.iter())
            .cloned()
            .collect();
        record.description = options.description.clone();
        self.storage.put_transaction(&record).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            reference = %reference,
            txid = %txid,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            total_in,
            total_out,
            fee,
            change = pending_change.as_ref().map_or(0, |c| c.satoshis),
            "Built action"
        );

        Ok(BuiltAction {
            reference: reference.to_string(),
            txid,
            unsigned_tx: tx,
            fee,
            total_in,
            total_out,
            pending_change,
        })
    }

    /// Sign every input with the wallet key and re-key the record to the signed txid
    ///
    /// Any failure here is fatal to the action: it is aborted before the
    /// error is returned.
    pub async fn sign_action(&self, action: BuiltAction) -> WalletResult<SignedAction> {
        match self.sign_inner(&action).await {
            Ok(signed) => Ok(signed),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(reference = %action.reference, error = %e, "Signing failed, aborting action");
                self.abort_action(&action.reference).await?;
                Err(e)
            }
        }
    }

    async fn sign_inner(&self, action: &BuiltAction) -> WalletResult<SignedAction> {
        let mut prev_outs = Vec::with_capacity(action.unsigned_tx.inputs.len());
        for input in &action.unsigned_tx.inputs {
            let output = self
                .storage
                .get_output(&input.outpoint)
                .await?
                .ok_or_else(|| WalletError::UtxoNotFound(input.outpoint.clone()))?;
            if output.is_spent() || output.reserved_by.as_deref() != Some(action.reference.as_str()) {
                return Err(WalletError::InvalidTransaction(format!(
                    "Input {} is no longer held by action {}",
                    input.outpoint, action.reference
                )));
            }
            prev_outs.push(PrevOut {
                satoshis: output.satoshis,
                locking_script: output.locking_script,
            });
        }

        let mut tx = action.unsigned_tx.clone();
        sign_p2pkh_inputs(&mut tx, &prev_outs, &self.key)?;
        let raw_tx = tx.serialize()?;
        let txid = txid_of(&raw_tx);

        let mut record = self
            .storage
            .get_transaction(&action.txid)
            .await?
            .ok_or_else(|| {
                WalletError::StorageError(format!("No pending record for {}", action.txid))
            })?;
        record.txid = txid.clone();
        record.raw_tx = hex::encode(&raw_tx);
        self.storage.rename_transaction(&action.txid, &record).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(reference = %action.reference, unsigned = %action.txid, txid = %txid, "Signed action");

        Ok(SignedAction {
            reference: action.reference.clone(),
            txid,
            signed_tx: tx,
            raw_tx,
            fee: action.fee,
            pending_change: action.pending_change.clone(),
        })
    }

    /// Broadcast, then commit the spend
    ///
    /// Accepted: inputs become spent by the txid, outputs paying the wallet
    /// are registered as change, the record becomes `Broadcast`.
    /// Rejected: reservations are released, the record becomes `Failed` and
    /// `BroadcastFailed` is returned. A network error leaves the action
    /// reserved and `Pending`, since the outcome is unknown.
    pub async fn internalize_action(&self, signed: SignedAction) -> WalletResult<InternalizeResult> {
        let mut record = self
            .storage
            .get_transaction(&signed.txid)
            .await?
            .ok_or_else(|| {
                WalletError::StorageError(format!("No pending record for {}", signed.txid))
            })?;
        if record.status != TransactionStatus::Pending {
            return Err(WalletError::InvalidStateTransition {
                from: record.status,
                to: TransactionStatus::Broadcast,
            });
        }

        let mut broadcast_log = vec![format!(
            "broadcasting {} ({} bytes)",
            signed.txid,
            signed.raw_tx.len()
        )];

        match self.chain.broadcast(&signed.raw_tx).await {
            Ok(accepted) => {
                broadcast_log.push(format!("accepted as {accepted}"));
                if accepted != signed.txid {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(local = %signed.txid, provider = %accepted, "Provider reported a different txid");
                    broadcast_log.push(format!(
                        "provider txid {accepted} differs from local {}",
                        signed.txid
                    ));
                }

                self.utxos
                    .mark_spent(&signed.inputs(), &signed.txid)
                    .await?;

                let own_script = self.key.locking_script();
                let change: Vec<WalletOutput> = signed
                    .signed_tx
                    .outputs
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.locking_script == own_script)
                    .map(|(vout, o)| {
                        let output = WalletOutput::new(
                            Outpoint::new(signed.txid.clone(), vout as u32),
                            o.satoshis,
                            o.locking_script.clone(),
                        )
                        .with_labels(record.labels.iter().cloned());
                        match &record.description {
                            Some(description) => output.with_description(description.clone()),
                            None => output,
                        }
                    })
                    .collect();
                let change_outputs = change.iter().map(|o| o.outpoint.clone()).collect();
                if !change.is_empty() {
                    self.utxos.register_change(change).await?;
                }

                record.transition(TransactionStatus::Broadcast)?;
                self.storage.put_transaction(&record).await?;

                #[cfg(feature = "tracing")]
                tracing::info!(txid = %signed.txid, fee = signed.fee, "Action internalized");

                Ok(InternalizeResult {
                    txid: signed.txid,
                    broadcast_log,
                    change_outputs,
                })
            }
            Err(WalletError::BroadcastFailed(message)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(txid = %signed.txid, error = %message, "Broadcast rejected, rolling back");
                self.utxos.release_reservation(&signed.reference).await?;
                record.transition(TransactionStatus::Failed)?;
                record.error = Some(message.clone());
                self.storage.put_transaction(&record).await?;
                Err(WalletError::BroadcastFailed(message))
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(txid = %signed.txid, error = %e, "Broadcast outcome unknown, action left pending");
                Err(e)
            }
        }
    }

    /// Retry internalizing a signed `Pending` record, e.g. after a network error
    pub async fn rebroadcast(&self, txid: &str) -> WalletResult<InternalizeResult> {
        let record = self
            .storage
            .get_transaction(txid)
            .await?
            .ok_or_else(|| WalletError::InvalidArgument(format!("Unknown transaction {txid}")))?;
        let signed = SignedAction::from_record(&record, &self.key.locking_script())?;
        if !signed.signed_tx.is_signed() {
            return Err(WalletError::InvalidTransaction(format!(
                "Transaction {txid} was never signed"
            )));
        }
        self.internalize_action(signed).await
    }

    /// Release an action's reservations and fail its pending record
    ///
    /// Returns the number of outputs released. Broadcast records are left alone.
    pub async fn abort_action(&self, reference: &str) -> WalletResult<usize> {
        let released = self.utxos.release_reservation(reference).await?;
        let records = self
            .storage
            .get_transactions(Some(TransactionFilter::new().with_reference(reference)))
            .await?;
        for mut record in records {
            if record.status == TransactionStatus::Pending {
                record.transition(TransactionStatus::Failed)?;
                record.error.get_or_insert_with(|| "aborted".to_string());
                self.storage.put_transaction(&record).await?;
            }
        }
        #[cfg(feature = "tracing")]
        tracing::info!(reference = %reference, released, "Action aborted");
        Ok(released)
    }

    /// Poll the provider for every `Broadcast` record and promote mined ones
    pub async fn refresh_confirmations(&self) -> WalletResult<ConfirmationReport> {
        let records = self
            .storage
            .get_transactions(Some(
                TransactionFilter::new().with_status(TransactionStatus::Broadcast),
            ))
            .await?;

        let mut report = ConfirmationReport {
            checked: records.len(),
            ..Default::default()
        };

        for mut record in records {
            let info = match self.chain.fetch_transaction(&record.txid).await {
                Ok(info) => info,
                Err(e) if e.is_network() => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(txid = %record.txid, error = %e, "Confirmation status unknown");
                    report.unknown += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some((height, info)) = info.and_then(|i| i.block_height.map(|h| (h, i))) else {
                report.still_unconfirmed += 1;
                continue;
            };

            record.transition(TransactionStatus::Confirmed)?;
            record.block_height = Some(height);
            record.block_hash = info.block_hash;
            match self.chain.fetch_merkle_proof(&record.txid).await {
                Ok(proof) => record.merkle_proof = proof,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(txid = %record.txid, error = %_e, "Merkle proof not available");
                }
            }
            self.storage.put_transaction(&record).await?;

            self.utxos.mark_mined(&record.txid, height).await?;

            #[cfg(feature = "tracing")]
            tracing::info!(txid = %record.txid, height, "Transaction confirmed");
            report.confirmed.push(record.txid);
        }

        Ok(report)
    }
}
