//! Error types for the Vault-backed wallets

use crate::store::StoreError;
use crate::wallet::WalletStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("wallet already open")]
    AlreadyOpen,

    #[error("wallet closed")]
    WalletClosed,

    #[error("unknown account")]
    UnknownAccount,

    #[error("not supported")]
    NotSupported,

    #[error("Approle configuration error: {0}")]
    AuthConfig(String),

    #[error("invalid secret descriptor: wallet {wallet}, secret {secret}: version must be integer >= 0, got {version}")]
    InvalidDescriptor {
        wallet: String,
        secret: String,
        version: i64,
    },

    #[error("secret store transport error: {0}")]
    Transport(#[from] StoreError),

    #[error("{reason}: wallet {wallet}, secret {secret}")]
    Format {
        wallet: String,
        secret: String,
        reason: String,
    },

    #[error("Vault health check failed: {0}")]
    HealthCheckFailed(#[source] StoreError),

    #[error("Vault health check result - Initialized: {initialized}, Sealed: {sealed}")]
    StoreDegraded {
        status: WalletStatus,
        initialized: bool,
        sealed: bool,
    },

    #[error("invalid wallet URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid private key: {0}")]
    KeyParse(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The wallet status that accompanies this error, if the error describes
    /// a known degraded state of the store rather than an outright failure.
    pub fn status(&self) -> Option<WalletStatus> {
        match self {
            Error::StoreDegraded { status, .. } => Some(*status),
            Error::HealthCheckFailed(_) => Some(WalletStatus::HealthCheckFailed),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
