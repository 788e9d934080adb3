//! SQLite storage implementation for wallet records
//!
//! This module provides a SQLite-based storage backend that implements the
//! `WalletStorage` trait for persisting outputs, transactions and settings.

use async_trait::async_trait;
use rusqlite::{params, types::Type, Row};
use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio_rusqlite::Connection;

use crate::{
    data_structures::{
        Decoration, MerkleProof, Outpoint, SpentBy, TransactionRecord, TransactionStatus,
        WalletOutput,
    },
    errors::{WalletError, WalletResult},
    storage::{OutputFilter, SqlitePerformanceConfig, TransactionFilter, WalletStorage},
};

/// SQLite storage backend for wallet records
pub struct SqliteStorage {
    connection: Connection,
    performance_config: SqlitePerformanceConfig,
    initialized: AtomicBool,
}

/// Output columns serialized ahead of the blocking call
struct OutputRow {
    txid: String,
    vout: i64,
    satoshis: i64,
    locking_script: Vec<u8>,
    spendable: bool,
    is_change: bool,
    labels_json: String,
    description: Option<String>,
    created_at: i64,
    block_height: Option<i64>,
    spent_by: Option<String>,
    spent_at: Option<i64>,
    reserved_by: Option<String>,
    decoration_json: Option<String>,
    decorated: bool,
}

impl OutputRow {
    fn from_output(output: &WalletOutput) -> WalletResult<Self> {
        Ok(Self {
            txid: output.outpoint.txid.clone(),
            vout: output.outpoint.vout as i64,
            satoshis: output.satoshis as i64,
            locking_script: output.locking_script.clone(),
            spendable: output.spendable,
            is_change: output.is_change,
            labels_json: serde_json::to_string(&output.labels)?,
            description: output.description.clone(),
            created_at: output.created_at as i64,
            block_height: output.block_height.map(|h| h as i64),
            spent_by: output.spent_by.as_ref().map(|s| s.as_str().to_string()),
            spent_at: output.spent_at.map(|t| t as i64),
            reserved_by: output.reserved_by.clone(),
            decoration_json: output
                .decoration
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            decorated: output.is_decorated(),
        })
    }

    fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO outputs (
                txid, vout, satoshis, locking_script, spendable, is_change, labels_json,
                description, created_at, block_height, spent_by, spent_at, reserved_by,
                decoration_json, decorated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                self.txid,
                self.vout,
                self.satoshis,
                self.locking_script,
                self.spendable,
                self.is_change,
                self.labels_json,
                self.description,
                self.created_at,
                self.block_height,
                self.spent_by,
                self.spent_at,
                self.reserved_by,
                self.decoration_json,
                self.decorated,
            ],
        )
    }
}

/// Transaction columns serialized ahead of the blocking call
struct TransactionRow {
    txid: String,
    reference: String,
    raw_tx: String,
    status: i64,
    net_satoshis: i64,
    fee: i64,
    block_height: Option<i64>,
    block_hash: Option<String>,
    timestamp: i64,
    labels_json: String,
    description: Option<String>,
    inputs_json: String,
    has_change: bool,
    error: Option<String>,
    merkle_proof_json: Option<String>,
}

impl TransactionRow {
    fn from_record(record: &TransactionRecord) -> WalletResult<Self> {
        Ok(Self {
            txid: record.txid.clone(),
            reference: record.reference.clone(),
            raw_tx: record.raw_tx.clone(),
            status: record.status as i64,
            net_satoshis: record.net_satoshis,
            fee: record.fee as i64,
            block_height: record.block_height.map(|h| h as i64),
            block_hash: record.block_hash.clone(),
            timestamp: record.timestamp as i64,
            labels_json: serde_json::to_string(&record.labels)?,
            description: record.description.clone(),
            inputs_json: serde_json::to_string(&record.inputs)?,
            has_change: record.has_change,
            error: record.error.clone(),
            merkle_proof_json: record
                .merkle_proof
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }

    fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO transactions (
                txid, reference, raw_tx, status, net_satoshis, fee, block_height, block_hash,
                timestamp, labels_json, description, inputs_json, has_change, error,
                merkle_proof_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                self.txid,
                self.reference,
                self.raw_tx,
                self.status,
                self.net_satoshis,
                self.fee,
                self.block_height,
                self.block_hash,
                self.timestamp,
                self.labels_json,
                self.description,
                self.inputs_json,
                self.has_change,
                self.error,
                self.merkle_proof_json,
            ],
        )
    }
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row,
    column: &str,
) -> rusqlite::Result<Option<T>> {
    let Some(text) = row.get::<_, Option<String>>(column)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

impl SqliteStorage {
    /// Create a new SQLite storage instance backed by a file
    pub async fn new<P: AsRef<Path>>(database_path: P) -> WalletResult<Self> {
        Self::new_with_config(database_path, SqlitePerformanceConfig::production_optimized())
            .await
    }

    /// Create a new SQLite storage instance with custom performance configuration
    pub async fn new_with_config<P: AsRef<Path>>(
        database_path: P,
        performance_config: SqlitePerformanceConfig,
    ) -> WalletResult<Self> {
        let connection = Connection::open(database_path).await.map_err(|e| {
            WalletError::StorageError(format!("Failed to open SQLite database: {e}"))
        })?;
        Self::from_connection(connection, performance_config).await
    }

    /// Create an in-memory SQLite storage instance (useful for testing)
    pub async fn new_in_memory() -> WalletResult<Self> {
        let connection = Connection::open(":memory:").await.map_err(|e| {
            WalletError::StorageError(format!("Failed to create in-memory database: {e}"))
        })?;
        Self::from_connection(connection, SqlitePerformanceConfig::in_memory()).await
    }

    async fn from_connection(
        connection: Connection,
        performance_config: SqlitePerformanceConfig,
    ) -> WalletResult<Self> {
        let storage = Self {
            connection,
            performance_config,
            initialized: AtomicBool::new(false),
        };

        // Pragmas must land before any table is created
        storage
            .performance_config
            .apply_to_connection(&storage.connection)
            .await?;

        Ok(storage)
    }

    fn ensure_initialized(&self) -> WalletResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(WalletError::StoreNotInitialized)
        }
    }

    /// Create the database schema
    async fn create_schema(&self) -> WalletResult<()> {
        let sql = r#"
            -- Outputs keyed by outpoint
            CREATE TABLE IF NOT EXISTS outputs (
                txid TEXT NOT NULL,
                vout INTEGER NOT NULL,
                satoshis INTEGER NOT NULL,
                locking_script BLOB NOT NULL,
                spendable BOOLEAN NOT NULL DEFAULT TRUE,
                is_change BOOLEAN NOT NULL DEFAULT FALSE,
                labels_json TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                created_at INTEGER NOT NULL,
                block_height INTEGER,
                spent_by TEXT,
                spent_at INTEGER,
                reserved_by TEXT,
                decoration_json TEXT,
                decorated BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,

                PRIMARY KEY (txid, vout)
            );

            -- Transactions keyed by txid
            CREATE TABLE IF NOT EXISTS transactions (
                txid TEXT PRIMARY KEY NOT NULL,
                reference TEXT NOT NULL,
                raw_tx TEXT NOT NULL,
                status INTEGER NOT NULL,
                net_satoshis INTEGER NOT NULL DEFAULT 0,
                fee INTEGER NOT NULL DEFAULT 0,
                block_height INTEGER,
                block_hash TEXT,
                timestamp INTEGER NOT NULL,
                labels_json TEXT NOT NULL DEFAULT '[]',
                description TEXT,
                inputs_json TEXT NOT NULL DEFAULT '[]',
                has_change BOOLEAN NOT NULL DEFAULT FALSE,
                error TEXT,
                merkle_proof_json TEXT,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Generic string-keyed settings
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );

            -- Indexes for the UTXO manager's filtered scans
            CREATE INDEX IF NOT EXISTS idx_outputs_spendable ON outputs(spendable, spent_by);
            CREATE INDEX IF NOT EXISTS idx_outputs_block_height ON outputs(block_height);
            CREATE INDEX IF NOT EXISTS idx_outputs_spent_by ON outputs(spent_by);
            CREATE INDEX IF NOT EXISTS idx_outputs_reserved_by ON outputs(reserved_by);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
            CREATE INDEX IF NOT EXISTS idx_transactions_reference ON transactions(reference);

            -- Rows are rewritten with INSERT OR REPLACE, so the column default
            -- stamps updated_at; UPDATE triggers from older schemas never fire
            DROP TRIGGER IF EXISTS update_outputs_timestamp;
            DROP TRIGGER IF EXISTS update_transactions_timestamp;
        "#;

        self.connection
            .call(move |conn| Ok(conn.execute_batch(sql)?))
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to create schema: {e}")))?;

        Ok(())
    }

    /// Convert a database row to a WalletOutput
    fn row_to_output(row: &Row) -> rusqlite::Result<WalletOutput> {
        let labels: BTreeSet<String> = json_column(row, "labels_json")?.unwrap_or_default();
        let decoration: Option<Decoration> = json_column(row, "decoration_json")?;

        Ok(WalletOutput {
            outpoint: Outpoint {
                txid: row.get("txid")?,
                vout: row.get::<_, i64>("vout")? as u32,
            },
            satoshis: row.get::<_, i64>("satoshis")? as u64,
            locking_script: row.get("locking_script")?,
            spendable: row.get("spendable")?,
            is_change: row.get("is_change")?,
            labels,
            description: row.get("description")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
            block_height: row.get::<_, Option<i64>>("block_height")?.map(|h| h as u32),
            spent_by: row
                .get::<_, Option<String>>("spent_by")?
                .map(|s| SpentBy::from_db(&s)),
            spent_at: row.get::<_, Option<i64>>("spent_at")?.map(|t| t as u64),
            reserved_by: row.get("reserved_by")?,
            decoration,
        })
    }

    /// Convert a database row to a TransactionRecord
    fn row_to_transaction(row: &Row) -> rusqlite::Result<TransactionRecord> {
        let status = TransactionStatus::try_from(row.get::<_, i64>("status")?)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(e)))?;
        let labels: BTreeSet<String> = json_column(row, "labels_json")?.unwrap_or_default();
        let inputs: Vec<Outpoint> = json_column(row, "inputs_json")?.unwrap_or_default();
        let merkle_proof: Option<MerkleProof> = json_column(row, "merkle_proof_json")?;

        Ok(TransactionRecord {
            txid: row.get("txid")?,
            reference: row.get("reference")?,
            raw_tx: row.get("raw_tx")?,
            status,
            net_satoshis: row.get("net_satoshis")?,
            fee: row.get::<_, i64>("fee")? as u64,
            block_height: row.get::<_, Option<i64>>("block_height")?.map(|h| h as u32),
            block_hash: row.get("block_hash")?,
            timestamp: row.get::<_, i64>("timestamp")? as u64,
            labels,
            description: row.get("description")?,
            inputs,
            has_change: row.get("has_change")?,
            error: row.get("error")?,
            merkle_proof,
        })
    }

    /// Build WHERE clause and parameters from the indexed part of an output filter
    fn build_output_filter_clause(
        filter: &OutputFilter,
    ) -> (String, Vec<Box<dyn rusqlite::ToSql + Send>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

        if let Some(spendable) = filter.spendable {
            conditions.push("spendable = ?".to_string());
            params.push(Box::new(spendable));
        }

        if filter.unspent_only {
            conditions.push("spent_by IS NULL".to_string());
        }

        if filter.unconfirmed_only {
            conditions.push("block_height IS NULL".to_string());
        }

        if filter.confirmed_only {
            conditions.push("block_height IS NOT NULL".to_string());
        }

        if let Some(decorated) = filter.decorated {
            conditions.push("decorated = ?".to_string());
            params.push(Box::new(decorated));
        }

        if let Some(reference) = &filter.reserved_by {
            conditions.push("reserved_by = ?".to_string());
            params.push(Box::new(reference.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

#[async_trait]
impl WalletStorage for SqliteStorage {
    async fn initialize(&self) -> WalletResult<()> {
        self.create_schema().await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn put_output(&self, output: &WalletOutput) -> WalletResult<()> {
        self.ensure_initialized()?;
        let row = OutputRow::from_output(output)?;
        self.connection
            .call(move |conn| {
                row.insert(conn)?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save output: {e}")))
    }

    async fn put_outputs(&self, outputs: &[WalletOutput]) -> WalletResult<()> {
        self.ensure_initialized()?;
        if outputs.is_empty() {
            return Ok(());
        }
        let rows = outputs
            .iter()
            .map(OutputRow::from_output)
            .collect::<WalletResult<Vec<_>>>()?;
        self.connection
            .call(move |conn| {
                let tx = conn.transaction()?;
                for row in &rows {
                    row.insert(&tx)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save outputs: {e}")))
    }

    async fn get_output(&self, outpoint: &Outpoint) -> WalletResult<Option<WalletOutput>> {
        self.ensure_initialized()?;
        let txid = outpoint.txid.clone();
        let vout = outpoint.vout as i64;
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT * FROM outputs WHERE txid = ? AND vout = ?")?;
                let mut rows = stmt.query_map(params![txid, vout], Self::row_to_output)?;

                if let Some(row) = rows.next() {
                    Ok(Some(row?))
                } else {
                    Ok(None)
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get output: {e}")))
    }

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<WalletOutput>> {
        self.ensure_initialized()?;
        let filter = filter.unwrap_or_default();
        let outputs = self
            .connection
            .call({
                let filter = filter.clone();
                move |conn| {
                    let mut query = "SELECT * FROM outputs".to_string();
                    let (where_clause, params_values) = Self::build_output_filter_clause(&filter);
                    if !where_clause.is_empty() {
                        query.push(' ');
                        query.push_str(&where_clause);
                    }
                    query.push_str(" ORDER BY created_at ASC, txid ASC, vout ASC");

                    let mut stmt = conn.prepare(&query)?;
                    let param_refs: Vec<&dyn rusqlite::ToSql> = params_values
                        .iter()
                        .map(|p| p.as_ref() as &dyn rusqlite::ToSql)
                        .collect();
                    let rows = stmt.query_map(&param_refs[..], Self::row_to_output)?;

                    let mut outputs = Vec::new();
                    for row in rows {
                        outputs.push(row?);
                    }
                    Ok(outputs)
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get outputs: {e}")))?;

        // Labels live in a JSON column, so the label predicate and the limit run here
        let mut outputs: Vec<WalletOutput> =
            outputs.into_iter().filter(|o| filter.matches(o)).collect();
        if let Some(limit) = filter.limit {
            outputs.truncate(limit);
        }
        Ok(outputs)
    }

    async fn delete_output(&self, outpoint: &Outpoint) -> WalletResult<bool> {
        self.ensure_initialized()?;
        let txid = outpoint.txid.clone();
        let vout = outpoint.vout as i64;
        self.connection
            .call(move |conn| {
                let rows = conn.execute(
                    "DELETE FROM outputs WHERE txid = ? AND vout = ?",
                    params![txid, vout],
                )?;
                Ok(rows > 0)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to delete output: {e}")))
    }

    async fn delete_spent_outputs_before(&self, cutoff: u64) -> WalletResult<usize> {
        self.ensure_initialized()?;
        self.connection
            .call(move |conn| {
                let rows = conn.execute(
                    "DELETE FROM outputs WHERE spent_by IS NOT NULL AND spent_at < ?",
                    params![cutoff as i64],
                )?;
                Ok(rows)
            })
            .await
            .map_err(|e| {
                WalletError::StorageError(format!("Failed to clean up spent outputs: {e}"))
            })
    }

    async fn put_transaction(&self, record: &TransactionRecord) -> WalletResult<()> {
        self.ensure_initialized()?;
        let row = TransactionRow::from_record(record)?;
        self.connection
            .call(move |conn| {
                row.insert(conn)?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save transaction: {e}")))
    }

    async fn get_transaction(&self, txid: &str) -> WalletResult<Option<TransactionRecord>> {
        self.ensure_initialized()?;
        let txid = txid.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT * FROM transactions WHERE txid = ?")?;
                let mut rows = stmt.query_map(params![txid], Self::row_to_transaction)?;

                if let Some(row) = rows.next() {
                    Ok(Some(row?))
                } else {
                    Ok(None)
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get transaction: {e}")))
    }

    async fn get_transactions(
        &self,
        filter: Option<TransactionFilter>,
    ) -> WalletResult<Vec<TransactionRecord>> {
        self.ensure_initialized()?;
        let filter = filter.unwrap_or_default();
        self.connection
            .call(move |conn| {
                let mut conditions = Vec::new();
                let mut params_values: Vec<Box<dyn rusqlite::ToSql + Send>> = Vec::new();

                if let Some(status) = filter.status {
                    conditions.push("status = ?");
                    params_values.push(Box::new(status as i64));
                }
                if let Some(reference) = &filter.reference {
                    conditions.push("reference = ?");
                    params_values.push(Box::new(reference.clone()));
                }

                let mut query = "SELECT * FROM transactions".to_string();
                if !conditions.is_empty() {
                    query.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
                }
                query.push_str(" ORDER BY timestamp ASC, txid ASC");
                if let Some(limit) = filter.limit {
                    query.push_str(&format!(" LIMIT {limit}"));
                }

                let mut stmt = conn.prepare(&query)?;
                let param_refs: Vec<&dyn rusqlite::ToSql> = params_values
                    .iter()
                    .map(|p| p.as_ref() as &dyn rusqlite::ToSql)
                    .collect();
                let rows = stmt.query_map(&param_refs[..], Self::row_to_transaction)?;

                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get transactions: {e}")))
    }

    async fn rename_transaction(
        &self,
        old_txid: &str,
        record: &TransactionRecord,
    ) -> WalletResult<()> {
        self.ensure_initialized()?;
        let old_txid = old_txid.to_string();
        let row = TransactionRow::from_record(record)?;
        self.connection
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed =
                    tx.execute("DELETE FROM transactions WHERE txid = ?", params![old_txid])?;
                if removed == 0 {
                    return Err(tokio_rusqlite::Error::Rusqlite(
                        rusqlite::Error::QueryReturnedNoRows,
                    ));
                }
                row.insert(&tx)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to rename transaction: {e}")))
    }

    async fn delete_transaction(&self, txid: &str) -> WalletResult<bool> {
        self.ensure_initialized()?;
        let txid = txid.to_string();
        self.connection
            .call(move |conn| {
                let rows = conn.execute("DELETE FROM transactions WHERE txid = ?", params![txid])?;
                Ok(rows > 0)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to delete transaction: {e}")))
    }

    async fn put_setting(&self, key: &str, value: &str) -> WalletResult<()> {
        self.ensure_initialized()?;
        let key = key.to_string();
        let value = value.to_string();
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                    params![key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save setting: {e}")))
    }

    async fn get_setting(&self, key: &str) -> WalletResult<Option<String>> {
        self.ensure_initialized()?;
        let key = key.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
                let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;

                if let Some(row) = rows.next() {
                    Ok(Some(row?))
                } else {
                    Ok(None)
                }
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get setting: {e}")))
    }

    async fn get_settings(&self) -> WalletResult<HashMap<String, String>> {
        self.ensure_initialized()?;
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                let mut settings = HashMap::new();
                for row in rows {
                    let (key, value) = row?;
                    settings.insert(key, value);
                }
                Ok(settings)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get settings: {e}")))
    }

    async fn delete_setting(&self, key: &str) -> WalletResult<bool> {
        self.ensure_initialized()?;
        let key = key.to_string();
        self.connection
            .call(move |conn| {
                let rows = conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
                Ok(rows > 0)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to delete setting: {e}")))
    }

    async fn clear_all(&self) -> WalletResult<()> {
        self.ensure_initialized()?;
        self.connection
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM outputs", [])?;
                tx.execute("DELETE FROM transactions", [])?;
                tx.execute("DELETE FROM settings", [])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to clear storage: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn storage() -> SqliteStorage {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        storage.initialize().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let err = storage
            .get_output(&Outpoint::new("00".repeat(32), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::StoreNotInitialized));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let storage = storage().await;
        storage.initialize().await.unwrap();
        assert!(storage.is_initialized());
    }

    #[tokio::test]
    async fn test_output_persistence() {
        let storage = storage().await;
        let output = WalletOutput::new(Outpoint::new("ab".repeat(32), 2), 1234, vec![0x76, 0xa9])
            .with_block_height(Some(800_000))
            .with_labels(["payments", "inbound"])
            .with_description("salary")
            .with_decoration(Decoration::TokenA {
                origin: None,
                tick: Some("PEPE".into()),
                amount: Some("10".into()),
                payload: Value::Null,
            });

        storage.put_output(&output).await.unwrap();
        let loaded = storage.get_output(&output.outpoint).await.unwrap().unwrap();
        assert_eq!(loaded, output);
        assert!(!loaded.spendable);
    }

    #[tokio::test]
    async fn test_rewrite_restamps_without_triggers() {
        let storage = storage().await;
        let outpoint = Outpoint::new("cd".repeat(32), 1);
        let output = WalletOutput::new(outpoint.clone(), 500, vec![0x76]);
        storage.put_output(&output).await.unwrap();
        let mut reserved = output.clone();
        reserved.reserved_by = Some("action".into());
        storage.put_output(&reserved).await.unwrap();

        let (triggers, rows, stamped): (i64, i64, i64) = storage
            .connection
            .call(|conn| {
                let triggers = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'",
                    [],
                    |row| row.get(0),
                )?;
                let (rows, stamped) = conn.query_row(
                    "SELECT COUNT(*), COUNT(updated_at) FROM outputs",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok((triggers, rows, stamped))
            })
            .await
            .unwrap();
        assert_eq!(triggers, 0);
        assert_eq!((rows, stamped), (1, 1));
        let loaded = storage.get_output(&outpoint).await.unwrap().unwrap();
        assert_eq!(loaded.reserved_by.as_deref(), Some("action"));
    }

    #[tokio::test]
    async fn test_output_filters_push_down() {
        let storage = storage().await;
        let a = WalletOutput::new(Outpoint::new("01".repeat(32), 0), 100, vec![]);
        let b = WalletOutput::new(Outpoint::new("02".repeat(32), 0), 200, vec![])
            .with_block_height(Some(10))
            .with_labels(["tip"]);
        let mut c = WalletOutput::new(Outpoint::new("03".repeat(32), 0), 300, vec![]);
        c.mark_spent(SpentBy::Txid("ff".repeat(32)), 5);
        storage.put_outputs(&[a, b, c]).await.unwrap();

        assert_eq!(
            storage
                .get_outputs(Some(OutputFilter::spendable()))
                .await
                .unwrap()
                .len(),
            2
        );
        let unconfirmed = storage
            .get_outputs(Some(OutputFilter::spendable().unconfirmed()))
            .await
            .unwrap();
        assert_eq!(unconfirmed.len(), 1);
        assert_eq!(unconfirmed[0].satoshis, 100);
        let labelled = storage
            .get_outputs(Some(OutputFilter::new().with_label("tip")))
            .await
            .unwrap();
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].satoshis, 200);
    }

    #[tokio::test]
    async fn test_transaction_persistence_and_rename() {
        let storage = storage().await;
        let mut record = TransactionRecord::pending("aa".repeat(32), "ref-1".into(), "0100".into());
        record.fee = 50;
        record.inputs = vec![Outpoint::new("bb".repeat(32), 1)];
        record.has_change = true;
        storage.put_transaction(&record).await.unwrap();

        let loaded = storage.get_transaction(&record.txid).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let mut signed = record.clone();
        signed.txid = "cc".repeat(32);
        storage.rename_transaction(&record.txid, &signed).await.unwrap();
        assert!(storage.get_transaction(&record.txid).await.unwrap().is_none());

        let by_reference = storage
            .get_transactions(Some(TransactionFilter::new().with_reference("ref-1")))
            .await
            .unwrap();
        assert_eq!(by_reference.len(), 1);
        assert_eq!(by_reference[0].txid, signed.txid);
    }

    #[tokio::test]
    async fn test_settings_and_clear() {
        let storage = storage().await;
        storage.put_setting("sync.height", "100").await.unwrap();
        storage.put_setting("sync.height", "101").await.unwrap();
        assert_eq!(
            storage.get_setting("sync.height").await.unwrap().as_deref(),
            Some("101")
        );
        assert_eq!(storage.get_settings().await.unwrap().len(), 1);

        storage.clear_all().await.unwrap();
        assert!(storage.get_settings().await.unwrap().is_empty());
        assert!(!storage.delete_setting("sync.height").await.unwrap());
    }
}
