//! Vanity Transfer - token transfers whose transaction hash ends in a chosen suffix
//!
//! Searches nonces for a signed transfer whose hash matches the requested
//! suffix, fills the nonces the search skipped, then broadcasts the match and
//! waits for its receipt.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod chain;
mod config;
mod coordination;
mod error;
mod metrics;
mod state;
#[cfg(test)]
mod testing;
mod tx;

use chain::RpcChainClient;
use config::Settings;
use coordination::{AccountLocks, EngineOptions, ProgressCallback, TransferOrchestrator, TransferRequest};
use metrics::MetricsServer;
use state::ResultStore;
use tx::{FeeTier, SearchProgress, TxSigner, WalletSigner};

#[derive(Parser)]
#[command(name = "vanity-transfer", version, about)]
struct Cli {
    /// Configuration file (overrides VANITY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the signing account and the network it is connected to
    Address,
    /// Find a matching transaction and save it without broadcasting
    Search {
        #[command(flatten)]
        transfer: TransferArgs,
        /// Directory to save the result in (defaults to storage.results_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Broadcast a saved search result, filling skipped nonces first
    Submit {
        file: PathBuf,
        /// Keep the result file after a confirmed submission
        #[arg(long)]
        keep: bool,
    },
    /// Search and submit in one step
    Send {
        #[command(flatten)]
        transfer: TransferArgs,
    },
    /// List saved search results that have not been submitted
    Results,
}

#[derive(clap::Args)]
struct TransferArgs {
    /// Recipient address
    #[arg(long)]
    receiver: String,
    /// Token amount in whole units, e.g. 12.5
    #[arg(long)]
    amount: String,
    /// Hex digits the transaction hash must end with
    #[arg(long)]
    suffix: String,
    /// Gas price tier
    #[arg(long, value_enum)]
    tier: Option<FeeTier>,
}

impl From<TransferArgs> for TransferRequest {
    fn from(args: TransferArgs) -> Self {
        Self {
            receiver: args.receiver,
            amount: args.amount,
            suffix: args.suffix,
            tier: args.tier,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    init_logging(settings.logging.json);
    info!("Starting Vanity Transfer v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let signal_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping...");
            cancel.cancel();
        }
    });

    let result = run(cli.command, &settings, &cancel).await;

    signal_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    result
}

async fn run(command: Command, settings: &Settings, cancel: &CancellationToken) -> Result<()> {
    if let Command::Results = command {
        return list_results(&ResultStore::new(settings.storage.results_dir.clone()));
    }

    let signer: Arc<dyn TxSigner> = Arc::new(
        WalletSigner::from_env(&settings.wallet.private_key_env)
            .context("Failed to load signing key")?,
    );
    let client = Arc::new(RpcChainClient::new(settings.chain.clone())?);
    let options = EngineOptions::from_settings(settings)?;

    let mut engine =
        TransferOrchestrator::new(signer, client, options, Arc::new(AccountLocks::new()))?;
    let identity = engine.initialize().await?;

    match command {
        Command::Address => {
            println!("{:?} on chain {}", identity.address, identity.chain_id);
        }
        Command::Search { transfer, out } => {
            let request = TransferRequest::from(transfer);
            let found = engine
                .generate_transaction(&request, cancel, progress_logger())
                .await?;

            let store = ResultStore::new(out.unwrap_or_else(|| settings.storage.results_dir.clone()));
            let path = store.save(&found)?;

            println!("Transaction hash: {:?}", found.tx_hash);
            println!("Nonce: {} ({} skipped)", found.nonce, found.skipped_nonces());
            println!("Attempts: {}", found.attempts);
            println!("Saved to {}", path.display());
        }
        Command::Submit { file, keep } => {
            let found = ResultStore::load(&file)?;
            let receipt = engine.submit_transfer_transaction(&found, cancel).await?;

            println!("{}", serde_json::to_string_pretty(&receipt)?);
            if !keep {
                ResultStore::remove(&file)?;
            }
        }
        Command::Send { transfer } => {
            let request = TransferRequest::from(transfer);
            let receipt = engine
                .generate_and_submit(&request, cancel, progress_logger())
                .await?;

            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Results => {}
    }

    Ok(())
}

fn list_results(store: &ResultStore) -> Result<()> {
    let results = store.list()?;
    if results.is_empty() {
        println!("No saved results in {}", store.dir().display());
        return Ok(());
    }

    for result in results {
        println!(
            "{}  {:?}  nonce {} (from {})  chain {}  suffix {}",
            result.found_at.format("%Y-%m-%d %H:%M:%S"),
            result.tx_hash,
            result.nonce,
            result.initial_nonce,
            result.chain_id,
            result.suffix
        );
    }
    Ok(())
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|progress: &SearchProgress| {
        info!(
            "Attempts: {}, nonce: {}, last hash: {:?}",
            progress.attempts, progress.nonce, progress.last_hash
        );
    })
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vanity_transfer=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
