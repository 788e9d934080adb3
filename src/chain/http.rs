//! HTTP chain provider and ordinal indexer clients
//!
//! [`HttpChainClient`] speaks a WhatsOnChain-style REST API
//! (`{base}/{main|test}/...`). [`HttpOrdinalIndexer`] speaks a 1Sat-ordinals
//! style API (`{base}/api/txos/address/{address}/unspent`).
//!
//! Transport failures and non-success statuses map to
//! [`WalletError::NetworkError`]; only a relay's explicit refusal of a
//! broadcast maps to [`WalletError::BroadcastFailed`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{
    BroadcastResponse, ChainClient, DecoratedUtxo, OrdinalIndexer, Origin, RemoteUtxo, TxInfo,
};
use crate::{
    config::Network,
    data_structures::MerkleProof,
    errors::{WalletError, WalletResult},
    keys::locking_script_for_address,
};

pub const DEFAULT_CHAIN_API_URL: &str = "https://api.whatsonchain.com/v1/bsv";
pub const DEFAULT_INDEXER_API_URL: &str = "https://ordinals.gorillapool.io";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(timeout: Duration) -> WalletResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {e}")))
}

/// Unspent entry as returned by `/address/{address}/unspent`
#[derive(Debug, Deserialize)]
struct HttpUnspent {
    #[serde(default)]
    height: u32,
    tx_pos: u32,
    tx_hash: String,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct HttpTxInfo {
    txid: String,
    #[serde(default)]
    blockhash: Option<String>,
    #[serde(default)]
    blockheight: Option<u32>,
    #[serde(default)]
    confirmations: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HttpChainInfo {
    blocks: u32,
}

/// Proof endpoint answers with either a single object or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HttpProofResponse {
    Many(Vec<MerkleProof>),
    One(MerkleProof),
}

/// WhatsOnChain-style chain provider
pub struct HttpChainClient {
    client: Client,
    base_url: String,
    network: Network,
    timeout: Duration,
}

impl HttpChainClient {
    /// Client against `base_url` (without the network segment)
    pub fn new(base_url: impl Into<String>, network: Network) -> WalletResult<Self> {
        Self::with_timeout(base_url, network, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        network: Network,
        timeout: Duration,
    ) -> WalletResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            network,
            timeout,
        })
    }

    /// Client against the public WhatsOnChain endpoint
    pub fn whatsonchain(network: Network) -> WalletResult<Self> {
        Self::new(DEFAULT_CHAIN_API_URL, network)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.network.api_segment(), path)
    }

    /// GET returning `None` on 404
    async fn get_optional(&self, path: &str) -> WalletResult<Option<reqwest::Response>> {
        let url = self.url(path);
        #[cfg(feature = "tracing")]
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("HTTP request failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {} for {}",
                response.status(),
                url
            )));
        }
        Ok(Some(response))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> WalletResult<Option<T>> {
        match self.get_optional(path).await? {
            Some(response) => {
                let parsed = response.json::<T>().await.map_err(|e| {
                    WalletError::NetworkError(format!("Failed to parse response: {e}"))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for HttpChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChainClient")
            .field("base_url", &self.base_url)
            .field("network", &self.network)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn fetch_utxos(&self, address: &str) -> WalletResult<Vec<RemoteUtxo>> {
        let script_hex = hex::encode(locking_script_for_address(address, self.network)?);
        let path = format!("/address/{address}/unspent");
        let unspent: Vec<HttpUnspent> = require_listing(self.get_json(&path).await?, &path)?;

        Ok(unspent
            .into_iter()
            .map(|u| RemoteUtxo {
                txid: u.tx_hash.to_lowercase(),
                vout: u.tx_pos,
                satoshis: u.value,
                locking_script_hex: script_hex.clone(),
                // Height 0 means mempool
                block_height: (u.height > 0).then_some(u.height),
            })
            .collect())
    }

    async fn fetch_transaction(&self, txid: &str) -> WalletResult<Option<TxInfo>> {
        let info: Option<HttpTxInfo> = self.get_json(&format!("/tx/hash/{txid}")).await?;
        Ok(info.map(|i| TxInfo {
            txid: i.txid,
            block_height: i.blockheight.filter(|h| *h > 0),
            block_hash: i.blockhash.filter(|h| !h.is_empty()),
            confirmations: i.confirmations,
        }))
    }

    async fn fetch_raw_transaction(&self, txid: &str) -> WalletResult<Option<Vec<u8>>> {
        match self.get_optional(&format!("/tx/{txid}/hex")).await? {
            Some(response) => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| WalletError::NetworkError(format!("Failed to read body: {e}")))?;
                Ok(Some(hex::decode(text.trim().trim_matches('"'))?))
            }
            None => Ok(None),
        }
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> WalletResult<String> {
        let url = self.url("/tx/raw");
        #[cfg(feature = "tracing")]
        tracing::debug!(url = %url, bytes = raw_tx.len(), "Broadcasting transaction");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "txhex": hex::encode(raw_tx) }))
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("Broadcast request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WalletError::NetworkError(format!("Failed to read body: {e}")))?;

        if status.is_server_error() {
            return Err(WalletError::NetworkError(format!(
                "Broadcast HTTP error {status}: {body}"
            )));
        }
        if !status.is_success() {
            return Err(WalletError::BroadcastFailed(body.trim().to_string()));
        }

        // Some relays answer with a JSON envelope instead of the bare txid
        let txid = match serde_json::from_str::<BroadcastResponse>(&body) {
            Ok(envelope) => envelope.into_result()?.to_lowercase(),
            Err(_) => body.trim().trim_matches('"').to_lowercase(),
        };
        if txid.len() != 64 || hex::decode(&txid).is_err() {
            return Err(WalletError::BroadcastFailed(format!(
                "Unexpected broadcast response: {body}"
            )));
        }
        Ok(txid)
    }

    async fn fetch_merkle_proof(&self, txid: &str) -> WalletResult<Option<MerkleProof>> {
        let proof: Option<HttpProofResponse> =
            self.get_json(&format!("/tx/{txid}/proof/tsc")).await?;
        Ok(match proof {
            Some(HttpProofResponse::Many(list)) => list.into_iter().next(),
            Some(HttpProofResponse::One(proof)) => Some(proof),
            None => None,
        })
    }

    async fn current_height(&self) -> WalletResult<u32> {
        let info: HttpChainInfo = self
            .get_json("/chain/info")
            .await?
            .ok_or_else(|| WalletError::NetworkError("Chain info not available".to_string()))?;
        Ok(info.blocks)
    }
}

/// Output entry as returned by the ordinals indexer
#[derive(Debug, Deserialize)]
struct IndexerTxo {
    txid: String,
    vout: u32,
    #[serde(default)]
    satoshis: u64,
    /// Base64 locking script
    #[serde(default)]
    script: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    origin: Option<Origin>,
    /// Markers on the output itself, as opposed to its origin
    #[serde(default)]
    data: Option<Value>,
}

/// 1Sat-ordinals-style indexer client
pub struct HttpOrdinalIndexer {
    client: Client,
    base_url: String,
    network: Network,
}

impl HttpOrdinalIndexer {
    pub fn new(base_url: impl Into<String>, network: Network) -> WalletResult<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network,
        })
    }

    pub fn gorillapool(network: Network) -> WalletResult<Self> {
        Self::new(DEFAULT_INDEXER_API_URL, network)
    }

    fn convert(&self, txo: IndexerTxo, fallback_script: &str) -> DecoratedUtxo {
        let locking_script_hex = txo
            .script
            .as_deref()
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
            .map(hex::encode)
            .unwrap_or_else(|| fallback_script.to_string());

        let mut origin = txo.origin;
        // Output-level markers fill in what the origin does not carry
        if let Some(Value::Object(map)) = txo.data {
            let origin = origin.get_or_insert_with(Origin::default);
            let data = origin.data.get_or_insert_with(Default::default);
            for (key, value) in map {
                match key.as_str() {
                    "insc" if data.inscription.is_none() => data.inscription = Some(value),
                    "bsv20" if data.token_a.is_none() => data.token_a = Some(value),
                    "bsv21" if data.token_b.is_none() => data.token_b = Some(value),
                    "insc" | "bsv20" | "bsv21" => {}
                    _ => {
                        data.other.entry(key).or_insert(value);
                    }
                }
            }
        }

        DecoratedUtxo {
            txid: txo.txid.to_lowercase(),
            vout: txo.vout,
            satoshis: txo.satoshis,
            locking_script_hex,
            block_height: txo.height.filter(|h| *h > 0 && *h < 50_000_000),
            origin,
        }
    }
}

impl std::fmt::Debug for HttpOrdinalIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrdinalIndexer")
            .field("base_url", &self.base_url)
            .field("network", &self.network)
            .finish()
    }
}

#[async_trait]
impl OrdinalIndexer for HttpOrdinalIndexer {
    async fn fetch_decorated_utxos(&self, address: &str) -> WalletResult<Vec<DecoratedUtxo>> {
        let fallback_script = hex::encode(locking_script_for_address(address, self.network)?);
        let url = format!("{}/api/txos/address/{}/unspent", self.base_url, address);
        #[cfg(feature = "tracing")]
        tracing::debug!(url = %url, "Fetching decorated outputs");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("HTTP request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {} for {}",
                response.status(),
                url
            )));
        }
        let txos: Vec<IndexerTxo> = response
            .json()
            .await
            .map_err(|e| WalletError::NetworkError(format!("Failed to parse response: {e}")))?;

        Ok(txos
            .into_iter()
            .map(|txo| self.convert(txo, &fallback_script))
            .collect())
    }
}

/// A listing endpoint that answers 404 tells nothing about the address
///
/// Reading it as an empty set would make reconciliation mark every known
/// output spent, so it is a network error instead.
fn require_listing<T>(found: Option<T>, path: &str) -> WalletResult<T> {
    found.ok_or_else(|| WalletError::NetworkError(format!("Provider has no listing at {path}")))
}
