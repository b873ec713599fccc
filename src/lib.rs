//! Vault Signer
//!
//! Signing wallets whose private keys live in HashiCorp Vault:
//! - Each configured Vault connection becomes a wallet
//! - Each configured KV v2 secret becomes an account (address + key)
//! - Keys are read from Vault per signature and never stored locally
//!
//! # Security Model
//!
//! - Only addresses and secret locations are cached
//! - Key bytes are zeroed before every signing call returns, on success
//!   and on error
//! - Tokens and Approle credentials are held as `SecretString`
//! - Keys and tokens are never logged

pub mod backend;
pub mod config;
pub mod events;
pub mod store;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use backend::VaultBackend;
pub use config::{BackendConfig, ClientConnectionInfo, RefreshPolicy, SecretDescriptor, WalletConfig};
pub use error::{Error, Result};
pub use events::{Subscription, WalletEvent, WalletEventKind};
pub use wallet::{Account, VaultWallet, Wallet, WalletStatus};
