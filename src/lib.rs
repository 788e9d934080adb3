//! Lightweight UTXO wallet engine
//!
//! This crate keeps a local model of the outputs a single-key P2PKH wallet
//! controls, reconciles it against a remote chain provider, selects and
//! reserves inputs for new transactions and drives them through a
//! build, sign and internalize pipeline.
//!
//! ## Features
//!
//! - `storage`: Enables SQLite persistence of outputs, transactions and settings
//! - `http`: Enables the HTTP chain provider and ordinal indexer clients
//! - `tracing`: Structured logging through the `tracing` crate
//! - `cli`: Builds the `wallet` command line binary
//!
//! Without the `storage` feature, wallets operate in memory-only mode.
//!
//! ```toml
//! [dependencies]
//! lightweight_utxo_wallet = { version = "0.1", features = ["storage", "http"] }
//! ```

pub mod categorization;
pub mod chain;
pub mod common;
pub mod config;
pub mod crypto;
pub mod data_structures;
pub mod errors;
pub mod keys;
pub mod signing;
pub mod storage;
pub mod utxo;
pub mod wallet;

pub use categorization::{categorize, CategorizedOutputs, OutputCategory};
pub use chain::{ChainClient, OrdinalIndexer, RemoteUtxo, TxInfo};
pub use config::{Network, WalletConfig};
pub use data_structures::*;
pub use errors::*;
pub use keys::WalletKey;
pub use signing::{
    ActionOutput, BuiltAction, ConfirmationReport, CreateActionOptions, InternalizeResult,
    SignedAction,
};
pub use storage::{MemoryStorage, OutputFilter, TransactionFilter, WalletStorage};
#[cfg(feature = "storage")]
pub use storage::SqliteStorage;
pub use utxo::{Balance, SelectionOptions, SyncReport, UtxoManager};
pub use wallet::{Wallet, WalletBuilder};
