//! Reconciliation against the chain provider and the ordinal indexer,
//! run over the SQLite backend
#![cfg(feature = "storage")]

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use lightweight_utxo_wallet::{
    chain::{
        DecoratedUtxo, MockChainClient, MockNetworkFailureModes, MockOrdinalIndexer, Origin,
        OriginData, RemoteUtxo,
    },
    config::WalletConfig,
    data_structures::{Decoration, Outpoint, SpentBy},
    errors::WalletError,
    keys::WalletKey,
    storage::{OutputFilter, SqliteStorage, WalletStorage},
    utxo::{last_sync_key, sync_height_key},
    wallet::{Wallet, WalletBuilder},
};

fn remote(key: &WalletKey, tag: u8, satoshis: u64, height: Option<u32>) -> RemoteUtxo {
    RemoteUtxo {
        txid: format!("{tag:02x}").repeat(32),
        vout: 0,
        satoshis,
        locking_script_hex: hex::encode(key.locking_script()),
        block_height: height,
    }
}

async fn wallet_on(
    storage: SqliteStorage,
    key: WalletKey,
    chain: &MockChainClient,
    indexer: Option<MockOrdinalIndexer>,
) -> Wallet {
    let mut builder = WalletBuilder::new()
        .with_key(key)
        .with_config(WalletConfig::default())
        .with_storage(Arc::new(storage))
        .with_chain_client(Arc::new(chain.clone()));
    if let Some(indexer) = indexer {
        builder = builder.with_indexer(Arc::new(indexer));
    }
    builder.build().await.unwrap()
}

#[tokio::test]
async fn test_sync_inserts_marks_spent_and_restores() {
    let chain = MockChainClient::new();
    let key = WalletKey::generate(Default::default());
    let address = key.address();
    let a = remote(&key, 0xa1, 4_000, Some(100));
    let b = remote(&key, 0xb2, 2_500, None);
    chain.set_utxos(&address, vec![a.clone(), b.clone()]);

    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let wallet = wallet_on(storage, key, &chain, None).await;

    let report = wallet.sync().await.unwrap();
    assert_eq!(report.inserted, 2);
    let balance = wallet.balance().await.unwrap();
    assert_eq!((balance.confirmed, balance.unconfirmed), (4_000, 2_500));
    assert!(wallet
        .storage()
        .get_setting(&last_sync_key(&address))
        .await
        .unwrap()
        .is_some());
    assert_eq!(
        wallet
            .storage()
            .get_setting(&sync_height_key(&address))
            .await
            .unwrap()
            .as_deref(),
        Some("800000")
    );

    // b disappears and a gets mined deeper
    let mut deeper = a.clone();
    deeper.block_height = Some(101);
    chain.set_utxos(&address, vec![deeper]);
    let report = wallet.sync().await.unwrap();
    assert_eq!(report.marked_spent, 1);
    assert_eq!(report.updated, 1);
    let gone = wallet
        .storage()
        .get_output(&Outpoint::new(b.txid.clone(), 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(gone.spent_by, Some(SpentBy::Unknown));

    // A reorg brings it back
    chain.add_utxo(&address, b);
    let report = wallet.sync().await.unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(wallet.balance().await.unwrap().total(), 6_500);

    // Idempotent once converged
    assert_eq!(wallet.sync().await.unwrap().changes(), 0);
}

#[tokio::test]
async fn test_sync_tolerates_provider_lag_after_broadcast() {
    let chain = MockChainClient::new();
    let key = WalletKey::generate(Default::default());
    let address = key.address();
    chain.set_utxos(&address, vec![remote(&key, 0x01, 10_000, Some(50))]);

    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let wallet = wallet_on(storage, key, &chain, None).await;
    wallet.sync().await.unwrap();

    let recipient = WalletKey::generate(Default::default()).address();
    let sent = wallet.send(&recipient, 3_000).await.unwrap();

    // Provider still lists the spent input and does not know the change yet
    let report = wallet.sync().await.unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.marked_spent, 0);
    assert_eq!(report.skipped_in_flight, 2);
    assert_eq!(wallet.balance().await.unwrap().unconfirmed, 10_000 - 3_000 - 50);

    // Provider catches up
    chain.mine(&sent.txid, 800_001);
    chain.set_utxos(
        &address,
        vec![RemoteUtxo {
            txid: sent.txid.clone(),
            vout: 1,
            satoshis: 6_950,
            locking_script_hex: String::new(),
            block_height: Some(800_001),
        }],
    );
    wallet.refresh_confirmations().await.unwrap();
    let report = wallet.sync().await.unwrap();
    assert_eq!(report.changes(), 0);
    assert_eq!(wallet.balance().await.unwrap().confirmed, 6_950);
}

#[tokio::test]
async fn test_network_failure_never_reads_as_empty() {
    let chain = MockChainClient::new();
    let key = WalletKey::generate(Default::default());
    let address = key.address();
    chain.set_utxos(&address, vec![remote(&key, 0x01, 1_234, Some(1))]);

    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let wallet = wallet_on(storage, key, &chain, None).await;
    wallet.sync().await.unwrap();

    chain.set_failure_modes(MockNetworkFailureModes {
        fail_all_reads: true,
        ..Default::default()
    });
    assert!(matches!(wallet.sync().await, Err(WalletError::NetworkError(_))));
    // Best-effort refresh falls back to the local view
    assert_eq!(wallet.refresh_balance().await.unwrap().total(), 1_234);
    let unspent = wallet
        .list_outputs(Some(OutputFilter::spendable()))
        .await
        .unwrap();
    assert_eq!(unspent.len(), 1);
}

#[tokio::test]
async fn test_decorated_sync_demotes_and_retires_assets() {
    let chain = MockChainClient::new();
    let indexer = MockOrdinalIndexer::new();
    let key = WalletKey::generate(Default::default());
    let address = key.address();
    let script_hex = hex::encode(key.locking_script());

    let ordinal = remote(&key, 0x0a, 1, Some(10));
    let funding = remote(&key, 0x0b, 9_000, Some(10));
    chain.set_utxos(&address, vec![ordinal.clone(), funding.clone()]);

    let mut token = DecoratedUtxo::plain(remote(&key, 0x0c, 1, Some(11)));
    token.origin = Some(Origin {
        outpoint: Some(format!("{}_0", "0c".repeat(32))),
        data: Some(OriginData {
            token_a: Some(json!({ "tick": "PEPE", "amt": "1000" })),
            ..Default::default()
        }),
    });
    let mut inscribed = DecoratedUtxo::plain(ordinal.clone());
    inscribed.origin = Some(Origin {
        outpoint: Some(format!("{}_0", "0a".repeat(32))),
        data: Some(OriginData {
            inscription: Some(json!({ "file": { "type": "image/png" } })),
            ..Default::default()
        }),
    });
    indexer.set_utxos(
        &address,
        vec![inscribed, token, DecoratedUtxo::plain(funding.clone())],
    );

    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::new(dir.path().join("wallet.db")).await.unwrap();
    let wallet = wallet_on(storage, key, &chain, Some(indexer.clone())).await;

    wallet.sync().await.unwrap();
    assert_eq!(wallet.balance().await.unwrap().confirmed, 9_001);

    let categorized = wallet.sync_decorated().await.unwrap();
    assert_eq!(categorized.ordinals.len(), 1);
    assert_eq!(categorized.token_a.len(), 1);
    assert_eq!(categorized.funding.len(), 1);

    // The 1-sat output is now an inscription and no longer counts
    assert_eq!(wallet.balance().await.unwrap().confirmed, 9_000);
    let demoted = wallet
        .storage()
        .get_output(&Outpoint::new(ordinal.txid.clone(), 0))
        .await
        .unwrap()
        .unwrap();
    assert!(!demoted.spendable);
    assert!(matches!(
        demoted.decoration,
        Some(Decoration::Inscription { ref content_type, .. }) if content_type.as_deref() == Some("image/png")
    ));

    let token_record = wallet
        .storage()
        .get_output(&Outpoint::new("0c".repeat(32), 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hex::encode(&token_record.locking_script), script_hex);
    assert!(matches!(
        token_record.decoration,
        Some(Decoration::TokenA { ref tick, .. }) if tick.as_deref() == Some("PEPE")
    ));

    // Token transferred away: the indexer stops listing it
    indexer.set_utxos(&address, vec![DecoratedUtxo::plain(funding)]);
    wallet.sync_decorated().await.unwrap();
    let retired = wallet
        .storage()
        .get_output(&Outpoint::new("0c".repeat(32), 0))
        .await
        .unwrap()
        .unwrap();
    assert!(retired.is_spent());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wallet.db");
    let chain = MockChainClient::new();
    let key = WalletKey::generate(Default::default());
    let wif = key.to_wif();
    chain.set_utxos(&key.address(), vec![remote(&key, 0x05, 7_777, Some(9))]);

    {
        let storage = SqliteStorage::new(&path).await.unwrap();
        let wallet = wallet_on(storage, key, &chain, None).await;
        wallet.sync().await.unwrap();
        wallet
            .utxos()
            .add_label(&Outpoint::new("05".repeat(32), 0), "savings")
            .await
            .unwrap();
    }

    let storage = SqliteStorage::new(&path).await.unwrap();
    let key = WalletKey::from_wif(&wif).unwrap();
    let wallet = wallet_on(storage, key, &chain, None).await;
    let outputs = wallet
        .list_outputs(Some(OutputFilter::spendable().with_label("savings")))
        .await
        .unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].satoshis, 7_777);
}
