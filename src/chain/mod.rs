//! Chain data provider and ordinal indexer contracts
//!
//! The engine never talks to a specific provider directly. It consumes the
//! [`ChainClient`] and [`OrdinalIndexer`] traits; HTTP implementations and
//! deterministic mocks live in the submodules.
//!
//! Every method may fail with [`WalletError::NetworkError`](crate::errors::WalletError).
//! Callers must read that as "unknown", never as "absent".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    data_structures::MerkleProof,
    errors::{WalletError, WalletResult},
};

#[cfg(feature = "http")]
pub mod http;
pub mod mocks;

#[cfg(feature = "http")]
pub use http::{HttpChainClient, HttpOrdinalIndexer};
pub use mocks::{BroadcastMode, MockChainClient, MockNetworkFailureModes, MockOrdinalIndexer};

/// A plain UTXO as reported by the chain provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUtxo {
    pub txid: String,
    pub vout: u32,
    pub satoshis: u64,
    pub locking_script_hex: String,
    pub block_height: Option<u32>,
}

/// Transaction status as reported by the chain provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    pub txid: String,
    pub block_height: Option<u32>,
    pub block_hash: Option<String>,
    pub confirmations: Option<u32>,
}

/// Provider answer to a broadcast request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub txid: Option<String>,
    pub error: Option<String>,
}

impl BroadcastResponse {
    /// Accepted txid, or `BroadcastFailed` with the provider's reason
    pub fn into_result(self) -> WalletResult<String> {
        match (self.success, self.txid) {
            (true, Some(txid)) if !txid.is_empty() => Ok(txid),
            (true, _) => Err(WalletError::BroadcastFailed(
                "Provider accepted the transaction without returning a txid".to_string(),
            )),
            (false, _) => Err(WalletError::BroadcastFailed(
                self.error.unwrap_or_else(|| "rejected".to_string()),
            )),
        }
    }
}

/// Indexer metadata attached to an ordinal output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    /// Outpoint of the inscription's genesis, `txid_vout`
    #[serde(default)]
    pub outpoint: Option<String>,
    #[serde(default)]
    pub data: Option<OriginData>,
}

/// Marker fields an indexer may set on an output; they are advisory and may
/// overlap, see [`categorize`](crate::categorization::categorize)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginData {
    #[serde(default, alias = "insc")]
    pub inscription: Option<Value>,
    /// Tick-based fungible token marker (`bsv20`)
    #[serde(default, alias = "bsv20")]
    pub token_a: Option<Value>,
    /// Contract-id fungible token marker (`bsv21`)
    #[serde(default, alias = "bsv21")]
    pub token_b: Option<Value>,
    #[serde(default, flatten)]
    pub other: Map<String, Value>,
}

/// A UTXO as reported by the ordinal/token indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoratedUtxo {
    pub txid: String,
    pub vout: u32,
    pub satoshis: u64,
    pub locking_script_hex: String,
    pub block_height: Option<u32>,
    #[serde(default)]
    pub origin: Option<Origin>,
}

impl DecoratedUtxo {
    /// Plain output with no indexer metadata
    pub fn plain(utxo: RemoteUtxo) -> Self {
        Self {
            txid: utxo.txid,
            vout: utxo.vout,
            satoshis: utxo.satoshis,
            locking_script_hex: utxo.locking_script_hex,
            block_height: utxo.block_height,
            origin: None,
        }
    }

    pub fn origin_data(&self) -> Option<&OriginData> {
        self.origin.as_ref().and_then(|o| o.data.as_ref())
    }

    pub fn origin_outpoint(&self) -> Option<&str> {
        self.origin
            .as_ref()
            .and_then(|o| o.outpoint.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Read/write adapter over the chain data provider
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current UTXO set for an address
    async fn fetch_utxos(&self, address: &str) -> WalletResult<Vec<RemoteUtxo>>;

    /// Transaction status, `None` when the provider does not know the txid
    async fn fetch_transaction(&self, txid: &str) -> WalletResult<Option<TxInfo>>;

    /// Raw transaction bytes
    async fn fetch_raw_transaction(&self, txid: &str) -> WalletResult<Option<Vec<u8>>>;

    /// Submit a raw transaction; returns the accepted txid or `BroadcastFailed`
    async fn broadcast(&self, raw_tx: &[u8]) -> WalletResult<String>;

    /// Merkle inclusion proof for a mined transaction
    async fn fetch_merkle_proof(&self, txid: &str) -> WalletResult<Option<MerkleProof>>;

    /// Best block height
    async fn current_height(&self) -> WalletResult<u32>;

    /// Provider's suggested fee rate in sat/kB, if it offers one
    async fn fee_rate_hint(&self) -> WalletResult<Option<u64>> {
        Ok(None)
    }
}

/// Source of decorated (inscription/token annotated) outputs
#[async_trait]
pub trait OrdinalIndexer: Send + Sync {
    async fn fetch_decorated_utxos(&self, address: &str) -> WalletResult<Vec<DecoratedUtxo>>;
}
