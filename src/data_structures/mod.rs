//! Core records tracked by the wallet engine

pub mod decoration;
pub mod outpoint;
pub mod transaction;
pub mod wallet_output;

pub use decoration::Decoration;
pub use outpoint::Outpoint;
pub use transaction::{MerkleProof, TransactionRecord, TransactionStatus};
pub use wallet_output::{SpentBy, WalletOutput, UNKNOWN_SPENDER};
