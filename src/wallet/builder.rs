//! Fluent construction of a [`Wallet`] session
//!
//! The builder collects the key, configuration and collaborators, checks that
//! nothing required is missing, initializes the store and wires the UTXO
//! manager and action pipeline together.

use std::sync::Arc;

use crate::{
    chain::{ChainClient, OrdinalIndexer},
    config::{Network, WalletConfig},
    errors::{WalletError, WalletResult},
    keys::WalletKey,
    signing::ActionPipeline,
    storage::WalletStorage,
    utxo::UtxoManager,
    wallet::Wallet,
};

/// How the wallet key is obtained
enum KeySource {
    Generate,
    Wif(String),
    Key(WalletKey),
}

/// Builder for wallet sessions
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use lightweight_utxo_wallet::{
///     chain::MockChainClient, storage::MemoryStorage, wallet::WalletBuilder,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let wallet = WalletBuilder::new()
///     .from_wif("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn")
///     .with_storage(Arc::new(MemoryStorage::new()))
///     .with_chain_client(Arc::new(MockChainClient::new()))
///     .build()
///     .await?;
/// println!("{}", wallet.address());
/// # Ok(())
/// # }
/// ```
pub struct WalletBuilder {
    key: Option<KeySource>,
    config: WalletConfig,
    storage: Option<Arc<dyn WalletStorage>>,
    chain: Option<Arc<dyn ChainClient>>,
    indexer: Option<Arc<dyn OrdinalIndexer>>,
}

impl Default for WalletBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletBuilder {
    pub fn new() -> Self {
        Self {
            key: None,
            config: WalletConfig::default(),
            storage: None,
            chain: None,
            indexer: None,
        }
    }

    /// Use a fresh random key on the configured network
    pub fn generate_new(mut self) -> Self {
        self.key = Some(KeySource::Generate);
        self
    }

    /// Import a WIF key; its prefix must match the configured network
    pub fn from_wif(mut self, wif: impl Into<String>) -> Self {
        self.key = Some(KeySource::Wif(wif.into()));
        self
    }

    pub fn with_key(mut self, key: WalletKey) -> Self {
        self.key = Some(KeySource::Key(key));
        self
    }

    pub fn with_config(mut self, config: WalletConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.config.network = network;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn WalletStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_chain_client(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Optional; without it `sync_decorated` is unavailable
    pub fn with_indexer(mut self, indexer: Arc<dyn OrdinalIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Validate, initialize the store and assemble the session
    ///
    /// # Errors
    ///
    /// * `WalletNotInitialized` - key, storage or chain client not supplied
    /// * `ConfigurationError` - invalid configuration or key/network mismatch
    /// * `KeyError` - the WIF could not be decoded
    pub async fn build(self) -> WalletResult<Wallet> {
        self.config.validate()?;

        let key = match self.key {
            None => {
                return Err(WalletError::WalletNotInitialized(
                    "key (call generate_new, from_wif or with_key)".to_string(),
                ))
            }
            Some(KeySource::Generate) => WalletKey::generate(self.config.network),
            Some(KeySource::Wif(wif)) => WalletKey::from_wif(&wif)?,
            Some(KeySource::Key(key)) => key,
        };
        if key.network() != self.config.network {
            return Err(WalletError::ConfigurationError(format!(
                "Key is for {} but the wallet is configured for {}",
                key.network(),
                self.config.network
            )));
        }

        let storage = self
            .storage
            .ok_or_else(|| WalletError::WalletNotInitialized("storage".to_string()))?;
        let chain = self
            .chain
            .ok_or_else(|| WalletError::WalletNotInitialized("chain client".to_string()))?;

        storage.initialize().await?;

        let key = Arc::new(key);
        let utxos = Arc::new(UtxoManager::new(
            storage.clone(),
            chain.clone(),
            self.config.clone(),
        ));
        let pipeline = ActionPipeline::new(
            utxos.clone(),
            storage.clone(),
            chain.clone(),
            key.clone(),
            self.config.clone(),
        );

        #[cfg(feature = "tracing")]
        tracing::info!(address = %key.address(), network = %self.config.network, "Wallet session ready");

        Ok(Wallet {
            config: self.config,
            key,
            storage,
            chain,
            indexer: self.indexer,
            utxos,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::MockChainClient, storage::MemoryStorage};

    const WIF_ONE: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";

    #[tokio::test]
    async fn test_builder_from_wif() {
        let wallet = WalletBuilder::new()
            .from_wif(WIF_ONE)
            .with_storage(Arc::new(MemoryStorage::new()))
            .with_chain_client(Arc::new(MockChainClient::new()))
            .build()
            .await
            .unwrap();
        assert_eq!(wallet.address(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        // Store was initialized by the builder
        assert_eq!(wallet.balance().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_builder_missing_parts() {
        let result = WalletBuilder::new()
            .with_storage(Arc::new(MemoryStorage::new()))
            .with_chain_client(Arc::new(MockChainClient::new()))
            .build()
            .await;
        assert!(matches!(result, Err(WalletError::WalletNotInitialized(_))));

        let result = WalletBuilder::new()
            .generate_new()
            .with_chain_client(Arc::new(MockChainClient::new()))
            .build()
            .await;
        assert!(matches!(result, Err(WalletError::WalletNotInitialized(m)) if m == "storage"));
    }

    #[tokio::test]
    async fn test_builder_rejects_network_mismatch_and_bad_config() {
        let result = WalletBuilder::new()
            .from_wif(WIF_ONE)
            .with_network(Network::Testnet)
            .with_storage(Arc::new(MemoryStorage::new()))
            .with_chain_client(Arc::new(MockChainClient::new()))
            .build()
            .await;
        assert!(matches!(result, Err(WalletError::ConfigurationError(_))));

        let result = WalletBuilder::new()
            .generate_new()
            .with_config(WalletConfig::default().with_fee_per_kb(0))
            .with_storage(Arc::new(MemoryStorage::new()))
            .with_chain_client(Arc::new(MockChainClient::new()))
            .build()
            .await;
        assert!(matches!(result, Err(WalletError::ConfigurationError(_))));
    }
}
