//! Vault-backed wallets
//!
//! Private keys stay in Vault. They are fetched for one signing operation
//! and zeroed before the call returns.

mod account;
mod keys;
mod locator;
mod signer;
mod vault;

pub use account::Account;
pub use keys::{KeyMaterial, KEY_LENGTH};
pub use signer::{SignedTransaction, SigningScheme, UnsignedTransaction, SIGNATURE_LENGTH};
pub use vault::{generate_and_store, VaultWallet};

use crate::Result;
use alloy::primitives::{ChainId, Signature, B256};
use async_trait::async_trait;
use url::Url;

/// BIP-32 style derivation path, accepted only to be refused
pub type DerivationPath = [u32];

/// Observable state of a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Closed,
    Open,
    Uninitialised,
    Sealed,
    HealthCheckFailed,
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WalletStatus::Closed => "Closed",
            WalletStatus::Open => "Open, vault initialised and unsealed",
            WalletStatus::Uninitialised => "Vault uninitialised",
            WalletStatus::Sealed => "Vault sealed",
            WalletStatus::HealthCheckFailed => "Vault healthcheck failed",
        };
        f.write_str(s)
    }
}

/// What an account manager needs from a wallet
#[async_trait]
pub trait Wallet: Send + Sync {
    fn url(&self) -> &Url;

    /// `Closed`/`Open` as `Ok`; a sealed or uninitialised store is an error
    /// carrying its status (see [`crate::Error::status`]).
    async fn status(&self) -> Result<WalletStatus>;

    /// The passphrase is ignored
    async fn open(&self, passphrase: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;

    async fn accounts(&self) -> Vec<Account>;

    async fn contains(&self, account: &Account) -> bool;

    fn derive(&self, path: &DerivationPath, pin: bool) -> Result<Account>;

    fn self_derive(&self, bases: &[&DerivationPath]);

    async fn sign_hash(&self, account: &Account, hash: &B256) -> Result<Signature>;

    async fn sign_tx(
        &self,
        account: &Account,
        tx: UnsignedTransaction,
        chain_id: Option<ChainId>,
    ) -> Result<SignedTransaction>;

    async fn sign_hash_with_passphrase(
        &self,
        account: &Account,
        _passphrase: &str,
        hash: &B256,
    ) -> Result<Signature> {
        self.sign_hash(account, hash).await
    }

    async fn sign_tx_with_passphrase(
        &self,
        account: &Account,
        _passphrase: &str,
        tx: UnsignedTransaction,
        chain_id: Option<ChainId>,
    ) -> Result<SignedTransaction> {
        self.sign_tx(account, tx, chain_id).await
    }
}
