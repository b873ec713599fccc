//! Vault Signer CLI
//!
//! Command-line access to Vault-backed wallets.

use alloy::primitives::B256;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vault_signer::store::HttpConnector;
use vault_signer::wallet::generate_and_store;
use vault_signer::{Account, BackendConfig, Error, Result, VaultBackend, Wallet};

#[derive(Parser)]
#[command(name = "vault-signer")]
#[command(about = "Sign with private keys held in HashiCorp Vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "vault-signer.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the status of every configured wallet
    Status,

    /// List the accounts of every configured wallet
    Accounts,

    /// Sign a 32-byte hash with an account
    SignHash {
        /// Account address
        #[arg(long)]
        address: String,

        /// Hash to sign (hex encoded, with or without 0x prefix)
        #[arg(long)]
        hash: String,
    },

    /// Generate a key and store it in the first secret of a wallet
    New {
        /// Position of the wallet in the config file
        #[arg(short, long, default_value_t = 0)]
        wallet: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = BackendConfig::from_file(&cli.config)?;

    match cli.command {
        Commands::Status => run_status(config).await,
        Commands::Accounts => run_accounts(config).await,
        Commands::SignHash { address, hash } => run_sign_hash(config, address, hash).await,
        Commands::New { wallet } => run_new(config, wallet).await,
    }
}

async fn run_status(config: BackendConfig) -> Result<()> {
    let backend = VaultBackend::new(config);

    for wallet in backend.wallets().await {
        if let Err(e) = wallet.open("").await {
            println!("{}: open failed: {}", wallet.url(), e);
            continue;
        }
        match wallet.status().await {
            Ok(status) => println!("{}: {}", wallet.url(), status),
            Err(e) => match e.status() {
                Some(status) => println!("{}: {} ({})", wallet.url(), status, e),
                None => println!("{}: {}", wallet.url(), e),
            },
        }
    }

    backend.shutdown().await;
    Ok(())
}

async fn run_accounts(config: BackendConfig) -> Result<()> {
    let backend = VaultBackend::new(config);

    for wallet in backend.wallets().await {
        wallet.open("").await?;
        if let Err(e) = wallet.refresh_accounts().await {
            tracing::warn!(wallet = %wallet.url(), error = %e, "Unable to load accounts");
            continue;
        }
        for account in wallet.accounts().await {
            let location = account.url.as_ref().map(|u| u.as_str()).unwrap_or("-");
            println!("{:?}  {}", account.address, location);
        }
    }

    backend.shutdown().await;
    Ok(())
}

async fn run_sign_hash(config: BackendConfig, address: String, hash: String) -> Result<()> {
    let address = alloy::primitives::Address::from_str(&address)
        .map_err(|e| Error::Config(format!("invalid address: {}", e)))?;
    let hash = B256::from_str(&hash).map_err(|e| Error::Config(format!("invalid hash: {}", e)))?;
    let account = Account::from_address(address);

    let backend = VaultBackend::new(config);
    let mut result = Err(Error::UnknownAccount);

    for wallet in backend.wallets().await {
        wallet.open("").await?;
        wallet.refresh_accounts().await?;
        if wallet.contains(&account).await {
            result = wallet.sign_hash(&account, &hash).await;
            break;
        }
    }

    backend.shutdown().await;
    let signature = result?;
    println!("0x{}", alloy::hex::encode(signature.as_bytes()));
    Ok(())
}

async fn run_new(config: BackendConfig, position: usize) -> Result<()> {
    let wallet_config = config
        .wallets
        .get(position)
        .ok_or_else(|| Error::Config(format!("no wallet at position {}", position)))?;

    let address = generate_and_store(wallet_config, Arc::new(HttpConnector)).await?;
    tracing::info!(%address, "Generated new account");
    println!("{:?}", address);
    Ok(())
}
