//! powchain node
//!
//! Key generation, a mining loop and chain statistics on top of the
//! `powchain` library.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use powchain::config::NodeConfig;
use powchain::crypto::PrivateKey;
use powchain::node::{BlockHandler, GenesisInfo};

#[derive(Parser)]
#[command(name = "powchain-node")]
#[command(about = "Minimal proof-of-work UTXO blockchain node", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a signing key and write it as hex
    Keygen {
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Mine blocks on the local chain until stopped
    Mine {
        /// Hex key file receiving the coinbase rewards
        #[arg(short, long)]
        key: PathBuf,

        /// Stop after this many blocks
        #[arg(short, long)]
        blocks: Option<u64>,
    },

    /// Print configuration, genesis and chain statistics
    Stats {
        /// Hex key file used when no stored genesis exists
        #[arg(short, long)]
        key: PathBuf,
    },
}

fn load_key(path: &Path) -> Result<PrivateKey> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading key file {}", path.display()))?;
    PrivateKey::from_hex(raw.trim())
        .with_context(|| format!("parsing key file {}", path.display()))
}

fn print_genesis(genesis: &GenesisInfo) {
    println!("Genesis Block Information:");
    println!("  Hash:        {}", genesis.hash);
    println!("  Height:      {}", genesis.height);
    println!("  Nonce:       {}", genesis.nonce);
    println!("  Beneficiary: {}", genesis.beneficiary.to_hex());
    println!("  Reward:      {}", genesis.reward);
    println!();
}

fn init_tracing(config: &NodeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn mine(config: NodeConfig, key: PrivateKey, blocks: Option<u64>) -> Result<()> {
    let handler = Arc::new(BlockHandler::open(&config, key.public_key())?);
    let shutdown = Arc::new(AtomicBool::new(false));

    info!(
        "Mining at difficulty {} for {}",
        config.difficulty,
        key.public_key().to_hex()
    );

    let mut worker = {
        let handler = Arc::clone(&handler);
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || {
            let mut mined = 0u64;
            while !shutdown.load(Ordering::SeqCst) && blocks.map_or(true, |max| mined < max) {
                if let Some(block) = handler.create_block() {
                    mined += 1;
                    let balance = handler
                        .latest_view()
                        .utxo_pool()
                        .get_balance(handler.miner().beneficiary());
                    info!(
                        "Block #{} | {} | balance {}",
                        block.height,
                        block.hash(),
                        balance
                    );
                }
            }
            mined
        })
    };

    let mined = tokio::select! {
        result = &mut worker => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping miner");
            shutdown.store(true, Ordering::SeqCst);
            handler.stop_mining();
            worker.await?
        }
    };

    let stats = handler.stats();
    info!("Mined {} blocks, tip at height {}", mined, stats.latest_height);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(cli.config.as_deref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Keygen { out } => {
            let key = PrivateKey::generate();
            std::fs::write(&out, key.to_hex())
                .with_context(|| format!("writing key file {}", out.display()))?;
            println!("{}", key.public_key().to_hex());
        }
        Commands::Mine { key, blocks } => {
            let key = load_key(&key)?;
            mine(config, key, blocks).await?;
        }
        Commands::Stats { key } => {
            let key = load_key(&key)?;
            let handler = BlockHandler::open(&config, key.public_key())?;
            print_genesis(handler.genesis());
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("{}", serde_json::to_string_pretty(&handler.stats())?);
        }
    }

    Ok(())
}
