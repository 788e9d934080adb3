//! SQLite connection tuning
//!
//! Pragmas applied when a [`SqliteStorage`](super::SqliteStorage) connection is
//! opened, before the schema is created.

use tokio_rusqlite::Connection;

use crate::errors::{WalletError, WalletResult};

/// SQLite pragma configuration for wallet storage
#[derive(Debug, Clone)]
pub struct SqlitePerformanceConfig {
    /// Enable WAL (Write-Ahead Logging) mode for better concurrency
    pub enable_wal_mode: bool,
    /// Set synchronous mode (0=OFF, 1=NORMAL, 2=FULL)
    pub synchronous_mode: u8,
    /// Cache size in KB
    pub cache_size_kb: i32,
    /// Temporary storage mode (0=default, 1=file, 2=memory)
    pub temp_store: u8,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,
    /// Enforce foreign keys
    pub foreign_keys: bool,
}

impl Default for SqlitePerformanceConfig {
    fn default() -> Self {
        Self::production_optimized()
    }
}

impl SqlitePerformanceConfig {
    /// Maximum durability; every commit is fsynced
    pub fn conservative() -> Self {
        Self {
            enable_wal_mode: true,
            synchronous_mode: 2, // FULL
            cache_size_kb: 16_000,
            temp_store: 2,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }

    /// WAL with NORMAL sync: durable across application crashes
    pub fn production_optimized() -> Self {
        Self {
            enable_wal_mode: true,
            synchronous_mode: 1, // NORMAL
            cache_size_kb: 32_000,
            temp_store: 2,
            busy_timeout_ms: 8000,
            foreign_keys: true,
        }
    }

    /// For `:memory:` databases, where WAL is unavailable and sync is moot
    pub fn in_memory() -> Self {
        Self {
            enable_wal_mode: false,
            synchronous_mode: 0,
            cache_size_kb: 8_000,
            temp_store: 2,
            busy_timeout_ms: 1000,
            foreign_keys: true,
        }
    }

    /// Check if configuration is suitable for on-disk wallet data
    pub fn is_production_safe(&self) -> bool {
        self.synchronous_mode > 0
    }

    /// Apply performance configuration to SQLite connection
    pub async fn apply_to_connection(&self, connection: &Connection) -> WalletResult<()> {
        let config = self.clone();
        connection
            .call(move |conn| {
                if config.enable_wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                }
                conn.pragma_update(None, "synchronous", config.synchronous_mode)?;
                // Negative = KB directly
                conn.pragma_update(None, "cache_size", -config.cache_size_kb)?;
                conn.pragma_update(None, "temp_store", config.temp_store)?;
                conn.pragma_update(None, "busy_timeout", config.busy_timeout_ms)?;
                conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to apply SQLite pragmas: {e}")))
    }
}
