//! UTXO Wallet CLI
//!
//! Drives a single-key wallet against a WhatsOnChain-style provider, keeping
//! its state in a SQLite database.
//!
//! ## Usage
//! ```bash
//! # Reconcile the wallet with the chain and show the balance
//! cargo run --bin wallet --features cli -- --wif "$WALLET_WIF" sync
//!
//! # List spendable outputs
//! cargo run --bin wallet --features cli -- --wif "$WALLET_WIF" utxos
//!
//! # Pay 10,000 sats
//! cargo run --bin wallet --features cli -- send 1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH 10000
//!
//! # Poll broadcast transactions for confirmations
//! cargo run --bin wallet --features cli -- confirmations
//! ```
//!
//! The key is read from `--wif` or the `WALLET_WIF` environment variable.
//! Log verbosity follows `RUST_LOG`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lightweight_utxo_wallet::{
    chain::{http::DEFAULT_CHAIN_API_URL, HttpChainClient, HttpOrdinalIndexer},
    common::format_number,
    config::{Network, WalletConfig},
    errors::WalletResult,
    signing::{ActionOutput, CreateActionOptions},
    storage::{OutputFilter, SqliteStorage},
    utxo::SelectionOptions,
    wallet::{Wallet, WalletBuilder},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// WIF private key of the wallet
    #[arg(long, env = "WALLET_WIF", hide_env_values = true)]
    wif: String,

    #[arg(long, default_value = "mainnet", help = "Network: mainnet or testnet")]
    network: Network,

    #[arg(
        long,
        default_value = "./utxo_wallet.db",
        help = "SQLite database file path (use :memory: for a throwaway session)"
    )]
    database: PathBuf,

    #[arg(long, help = "JSON wallet configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Chain provider base URL (defaults to WhatsOnChain)")]
    base_url: Option<String>,

    #[arg(long, default_value = "30", help = "Timeout for provider requests in seconds")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile local outputs with the provider
    Sync {
        #[arg(long, help = "Also pull ordinal and token outputs from the indexer")]
        decorated: bool,
    },
    /// Show the balance of spendable outputs
    Balance,
    /// List tracked outputs
    Utxos {
        #[arg(long, help = "Include spent and non-spendable outputs")]
        all: bool,
    },
    /// Pay an address
    Send {
        address: String,
        satoshis: u64,
        #[arg(long, help = "Override the fee rate in sats per 1000 bytes")]
        fee_per_kb: Option<u64>,
        #[arg(long, help = "Only spend outputs carrying this label", value_delimiter = ',')]
        labels: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Promote mined broadcast transactions to confirmed
    Confirmations,
    /// Retry the broadcast of a pending transaction
    Rebroadcast { txid: String },
}

async fn open_wallet(args: &CliArgs) -> WalletResult<Wallet> {
    let config = match &args.config {
        Some(path) => WalletConfig::from_file(path)?,
        None => WalletConfig::new(args.network),
    };
    let storage = if args.database.as_os_str() == ":memory:" {
        SqliteStorage::new_in_memory().await?
    } else {
        SqliteStorage::new(&args.database).await?
    };
    let base_url = args.base_url.as_deref().unwrap_or(DEFAULT_CHAIN_API_URL);
    let chain = HttpChainClient::with_timeout(
        base_url,
        config.network,
        Duration::from_secs(args.timeout),
    )?;
    let indexer = HttpOrdinalIndexer::gorillapool(config.network)?;

    WalletBuilder::new()
        .from_wif(args.wif.clone())
        .with_config(config)
        .with_storage(Arc::new(storage))
        .with_chain_client(Arc::new(chain))
        .with_indexer(Arc::new(indexer))
        .build()
        .await
}

async fn print_balance(wallet: &Wallet) -> WalletResult<()> {
    let balance = wallet.balance().await?;
    println!("💰 Balance for {}", wallet.address());
    println!("   Confirmed:   {} sats", format_number(balance.confirmed));
    println!("   Unconfirmed: {} sats", format_number(balance.unconfirmed));
    println!("   Total:       {} sats", format_number(balance.total()));
    Ok(())
}

async fn run(args: CliArgs) -> WalletResult<()> {
    let wallet = open_wallet(&args).await?;

    match args.command {
        Command::Sync { decorated } => {
            let report = wallet.sync().await?;
            println!(
                "🔄 Synced {} remote outputs: {} new, {} restored, {} spent, {} updated",
                report.remote_count,
                report.inserted,
                report.restored,
                report.marked_spent,
                report.updated
            );
            if report.skipped_in_flight > 0 {
                println!(
                    "   {} outputs awaiting our own broadcasts",
                    report.skipped_in_flight
                );
            }
            if decorated {
                let categorized = wallet.sync_decorated().await?;
                println!(
                    "🎨 Indexer: {} ordinals, {} tick tokens, {} contract tokens, {} funding",
                    categorized.ordinals.len(),
                    categorized.token_a.len(),
                    categorized.token_b.len(),
                    categorized.funding.len()
                );
            }
            print_balance(&wallet).await?;
        }
        Command::Balance => {
            wallet.refresh_balance().await?;
            print_balance(&wallet).await?;
        }
        Command::Utxos { all } => {
            let filter = (!all).then(OutputFilter::spendable);
            let outputs = wallet.list_outputs(filter).await?;
            if outputs.is_empty() {
                println!("No outputs");
            }
            for output in outputs {
                let height = output
                    .block_height
                    .map_or_else(|| "unconfirmed".to_string(), |h| h.to_string());
                let mut flags = Vec::new();
                if output.is_spent() {
                    flags.push("spent".to_string());
                }
                if let Some(reference) = &output.reserved_by {
                    flags.push(format!("reserved:{reference}"));
                }
                if output.is_decorated() {
                    flags.push("decorated".to_string());
                }
                flags.extend(output.labels.iter().cloned());
                println!(
                    "{}  {:>14} sats  {:>11}  {}",
                    output.outpoint,
                    format_number(output.satoshis),
                    height,
                    flags.join(",")
                );
            }
        }
        Command::Send {
            address,
            satoshis,
            fee_per_kb,
            labels,
            description,
        } => {
            let mut options = CreateActionOptions::new()
                .pay(ActionOutput::to_address(address, satoshis))
                .with_selection(SelectionOptions::new().with_labels(labels));
            if let Some(rate) = fee_per_kb {
                options = options.with_fee_per_kb(rate);
            }
            if let Some(description) = description {
                options = options.with_description(description);
            }
            let result = wallet.send_with(options).await?;
            println!("✅ Broadcast {}", result.txid);
            for line in &result.broadcast_log {
                println!("   {line}");
            }
        }
        Command::Confirmations => {
            let report = wallet.refresh_confirmations().await?;
            println!(
                "⛓️  Checked {}: {} confirmed, {} still unconfirmed, {} unknown",
                report.checked,
                report.confirmed.len(),
                report.still_unconfirmed,
                report.unknown
            );
            for txid in report.confirmed {
                println!("   {txid}");
            }
        }
        Command::Rebroadcast { txid } => {
            let result = wallet.rebroadcast(&txid).await?;
            println!("✅ Broadcast {}", result.txid);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
}
