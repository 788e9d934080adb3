//! Wallet session: the explicit context every operation runs in
//!
//! A [`Wallet`] owns one key, one configuration and handles to the store and
//! chain collaborators. There is no global state; two sessions over two
//! stores are fully independent.

use std::{sync::Arc, time::Duration};

use crate::{
    categorization::CategorizedOutputs,
    chain::{ChainClient, OrdinalIndexer},
    config::WalletConfig,
    data_structures::{TransactionRecord, WalletOutput},
    errors::{WalletError, WalletResult},
    keys::WalletKey,
    signing::{
        ActionOutput, ActionPipeline, BuiltAction, ConfirmationReport, CreateActionOptions,
        InternalizeResult, SignedAction,
    },
    storage::{OutputFilter, TransactionFilter, WalletStorage},
    utxo::{Balance, Selection, SelectionOptions, SyncReport, UtxoManager},
};

pub mod builder;

pub use builder::WalletBuilder;

pub struct Wallet {
    pub(crate) config: WalletConfig,
    pub(crate) key: Arc<WalletKey>,
    pub(crate) storage: Arc<dyn WalletStorage>,
    pub(crate) chain: Arc<dyn ChainClient>,
    pub(crate) indexer: Option<Arc<dyn OrdinalIndexer>>,
    pub(crate) utxos: Arc<UtxoManager>,
    pub(crate) pipeline: ActionPipeline,
}

impl Wallet {
    pub fn builder() -> WalletBuilder {
        WalletBuilder::new()
    }

    pub fn address(&self) -> String {
        self.key.address()
    }

    pub fn key(&self) -> &WalletKey {
        &self.key
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn WalletStorage> {
        &self.storage
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn utxos(&self) -> &UtxoManager {
        &self.utxos
    }

    pub fn pipeline(&self) -> &ActionPipeline {
        &self.pipeline
    }

    /// Reconcile the wallet address against the chain provider
    pub async fn sync(&self) -> WalletResult<SyncReport> {
        self.utxos.sync(&self.address()).await
    }

    /// Pull decorated outputs from the configured indexer
    pub async fn sync_decorated(&self) -> WalletResult<CategorizedOutputs> {
        let indexer = self
            .indexer
            .as_ref()
            .ok_or_else(|| WalletError::WalletNotInitialized("ordinal indexer".to_string()))?;
        self.utxos
            .sync_decorated(&self.address(), indexer.as_ref())
            .await
    }

    pub async fn balance(&self) -> WalletResult<Balance> {
        self.utxos.balance().await
    }

    /// Best-effort sync followed by the balance
    pub async fn refresh_balance(&self) -> WalletResult<Balance> {
        self.utxos.refresh_balance(&self.address()).await
    }

    pub async fn select(&self, target: u64, options: &SelectionOptions) -> WalletResult<Selection> {
        self.utxos.select(target, options).await
    }

    pub async fn list_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<WalletOutput>> {
        self.utxos.list_outputs(filter).await
    }

    pub async fn transactions(
        &self,
        filter: Option<TransactionFilter>,
    ) -> WalletResult<Vec<TransactionRecord>> {
        self.storage.get_transactions(filter).await
    }

    pub async fn create_action(&self, options: CreateActionOptions) -> WalletResult<BuiltAction> {
        self.pipeline.create_action(options).await
    }

    pub async fn sign_action(&self, action: BuiltAction) -> WalletResult<SignedAction> {
        self.pipeline.sign_action(action).await
    }

    pub async fn internalize_action(&self, signed: SignedAction) -> WalletResult<InternalizeResult> {
        self.pipeline.internalize_action(signed).await
    }

    pub async fn abort_action(&self, reference: &str) -> WalletResult<usize> {
        self.pipeline.abort_action(reference).await
    }

    pub async fn rebroadcast(&self, txid: &str) -> WalletResult<InternalizeResult> {
        self.pipeline.rebroadcast(txid).await
    }

    /// Build, sign and internalize in one call
    pub async fn send_with(&self, options: CreateActionOptions) -> WalletResult<InternalizeResult> {
        let built = self.pipeline.create_action(options).await?;
        let signed = self.pipeline.sign_action(built).await?;
        self.pipeline.internalize_action(signed).await
    }

    /// Pay `satoshis` to a P2PKH address
    pub async fn send(&self, address: &str, satoshis: u64) -> WalletResult<InternalizeResult> {
        self.send_with(CreateActionOptions::new().pay(ActionOutput::to_address(address, satoshis)))
            .await
    }

    pub async fn refresh_confirmations(&self) -> WalletResult<ConfirmationReport> {
        self.pipeline.refresh_confirmations().await
    }

    pub async fn cleanup_spent(&self, older_than: Duration) -> WalletResult<usize> {
        self.utxos.cleanup_spent(older_than).await
    }

    /// Drop every output, transaction and setting of this wallet
    pub async fn reset(&self) -> WalletResult<()> {
        #[cfg(feature = "tracing")]
        tracing::warn!(address = %self.address(), "Resetting wallet store");
        self.storage.clear_all().await
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .field("config", &self.config)
            .field("has_indexer", &self.indexer.is_some())
            .finish_non_exhaustive()
    }
}
