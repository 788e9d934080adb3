//! Storage abstraction layer for wallet records
//!
//! This module provides a trait-based storage system so the UTXO manager and
//! the action pipeline do not care where outputs, transactions and settings
//! live. SQLite is the durable backend; the memory backend serves tests and
//! throwaway sessions.

pub mod memory;
#[cfg(feature = "storage")]
pub mod performance_optimizations;
#[cfg(feature = "storage")]
pub mod sqlite;
pub mod storage_trait;

pub use memory::*;
#[cfg(feature = "storage")]
pub use performance_optimizations::*;
#[cfg(feature = "storage")]
pub use sqlite::*;
pub use storage_trait::*;
