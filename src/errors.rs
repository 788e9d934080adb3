//! Error types for the wallet engine
//!
//! Every fallible operation in the crate returns [`WalletResult`]. Errors are
//! typed so callers can tell a recoverable funding problem apart from a store
//! inconsistency or a transient network failure.

use thiserror::Error;

use crate::data_structures::{Outpoint, TransactionStatus};

/// Main error type for wallet operations
#[derive(Debug, Error)]
pub enum WalletError {
    /// Selection or build could not reach the required amount
    #[error("Insufficient funds: needed {needed} sats, available {available} sats")]
    InsufficientFunds { needed: u64, available: u64 },

    /// A referenced output is missing from the store
    #[error("UTXO not found: {0}")]
    UtxoNotFound(Outpoint),

    /// The store was used before `initialize()`
    #[error("Store not initialized")]
    StoreNotInitialized,

    /// The wallet session is missing a required component
    #[error("Wallet not initialized: {0}")]
    WalletNotInitialized(String),

    /// The chain provider could not be reached or returned garbage
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The chain provider rejected a transaction
    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    /// Structural validation failed (no inputs, no outputs, dust)
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A transaction record was asked to move backwards or sideways
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Storage backend failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization or decoding failure
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Key parsing or signing failure
    #[error("Key error: {0}")]
    KeyError(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WalletError {
    /// Whether the caller can reasonably retry (possibly with different input)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WalletError::InsufficientFunds { .. }
                | WalletError::NetworkError(_)
                | WalletError::BroadcastFailed(_)
        )
    }

    /// Whether this error means "outcome unknown" rather than "definitely absent"
    pub fn is_network(&self) -> bool {
        matches!(self, WalletError::NetworkError(_))
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(err: hex::FromHexError) -> Self {
        WalletError::SerializationError(format!("Invalid hex: {err}"))
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::SerializationError(format!("JSON error: {err}"))
    }
}

impl From<secp256k1::Error> for WalletError {
    fn from(err: secp256k1::Error) -> Self {
        WalletError::KeyError(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        WalletError::NetworkError(err.to_string())
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WalletError::InsufficientFunds {
            needed: 700,
            available: 500,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: needed 700 sats, available 500 sats"
        );

        let err = WalletError::UtxoNotFound(Outpoint::new("ab".repeat(32), 1));
        assert!(err.to_string().contains(&"ab".repeat(32)));
    }

    #[test]
    fn test_error_classification() {
        assert!(WalletError::NetworkError("timeout".into()).is_network());
        assert!(WalletError::NetworkError("timeout".into()).is_recoverable());
        assert!(!WalletError::StoreNotInitialized.is_recoverable());
        assert!(!WalletError::UtxoNotFound(Outpoint::new("00".repeat(32), 0)).is_recoverable());
    }

    #[test]
    fn test_hex_conversion() {
        let err: WalletError = hex::decode("zz").unwrap_err().into();
        assert!(matches!(err, WalletError::SerializationError(_)));
    }
}
