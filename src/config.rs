//! Wallet session configuration
//!
//! A [`WalletConfig`] is fixed for the lifetime of a session and is handed to
//! the UTXO manager and the action pipeline at construction time.

use serde::{Deserialize, Serialize};
use std::{fmt::Display, path::Path, str::FromStr};

use crate::errors::{WalletError, WalletResult};

/// Chain network the wallet operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Base58Check version byte for P2PKH addresses
    pub fn p2pkh_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    /// Base58Check version byte for WIF private keys
    pub fn wif_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xef,
        }
    }

    /// Path segment used by WhatsOnChain-style APIs
    pub fn api_segment(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            other => Err(WalletError::ConfigurationError(format!(
                "Unknown network: {other}"
            ))),
        }
    }
}

/// Per-session wallet settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WalletConfig {
    pub network: Network,
    /// Fee rate in satoshis per 1000 bytes
    pub fee_per_kb: u64,
    /// Smallest output value accepted from callers
    pub dust_limit: u64,
    /// Smallest change worth its own output; smaller excess goes to the fee
    pub change_threshold: u64,
    /// Cap on inputs a single selection may return
    pub max_inputs_per_tx: usize,
    /// Labels applied to every output and transaction the wallet creates
    pub default_labels: Vec<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            fee_per_kb: 50,
            dust_limit: 1,
            change_threshold: 546,
            max_inputs_per_tx: 100,
            default_labels: Vec::new(),
        }
    }
}

impl WalletConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Parse from a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> WalletResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WalletError::ConfigurationError(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> WalletResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WalletError::ConfigurationError(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn with_fee_per_kb(mut self, fee_per_kb: u64) -> Self {
        self.fee_per_kb = fee_per_kb;
        self
    }

    pub fn with_dust_limit(mut self, dust_limit: u64) -> Self {
        self.dust_limit = dust_limit;
        self
    }

    pub fn with_change_threshold(mut self, change_threshold: u64) -> Self {
        self.change_threshold = change_threshold;
        self
    }

    pub fn with_max_inputs_per_tx(mut self, max_inputs_per_tx: usize) -> Self {
        self.max_inputs_per_tx = max_inputs_per_tx;
        self
    }

    pub fn with_default_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.fee_per_kb == 0 {
            return Err(WalletError::ConfigurationError(
                "feePerKb must be greater than zero".to_string(),
            ));
        }
        if self.max_inputs_per_tx == 0 {
            return Err(WalletError::ConfigurationError(
                "maxInputsPerTx must be greater than zero".to_string(),
            ));
        }
        if self.change_threshold < self.dust_limit {
            return Err(WalletError::ConfigurationError(format!(
                "changeThreshold ({}) must not be below dustLimit ({})",
                self.change_threshold, self.dust_limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WalletConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.change_threshold, 546);
        assert_eq!(config.fee_per_kb, 50);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            WalletConfig::from_json_str(r#"{"network":"testnet","feePerKb":100}"#).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.fee_per_kb, 100);
        assert_eq!(config.max_inputs_per_tx, 100);
    }

    #[test]
    fn test_validation_errors() {
        assert!(WalletConfig::default().with_fee_per_kb(0).validate().is_err());
        assert!(WalletConfig::default()
            .with_max_inputs_per_tx(0)
            .validate()
            .is_err());
        assert!(WalletConfig::default()
            .with_dust_limit(1000)
            .with_change_threshold(546)
            .validate()
            .is_err());
        assert!(WalletConfig::from_json_str(r#"{"feePerKb":0}"#).is_err());
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("main".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("Testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!("regtest".parse::<Network>().is_err());
        assert_eq!(Network::Testnet.p2pkh_prefix(), 0x6f);
    }
}
