//! Configuration for Vault-backed wallets
//!
//! One [`WalletConfig`] per Vault connection, each listing the secrets whose
//! keys it exposes as accounts. The file format is JSON:
//!
//! ```json
//! {
//!   "wallets": [
//!     {
//!       "client": { "url": "https://vault.example.com:8200", "approle": "approle" },
//!       "secrets": [
//!         { "name": "acct1", "secret_engine": "secret", "version": 1,
//!           "account_field": "address", "key_field": "key" }
//!       ]
//!     }
//!   ],
//!   "refresh": { "mode": "manual" }
//! }
//! ```

pub mod env;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use env::{Credentials, EnvLookup};

/// Default per-request timeout applied by the HTTP store adapter
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection details for one Vault server
///
/// Only used while opening a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectionInfo {
    /// Base URL of the Vault server, including the scheme
    pub url: String,
    /// Mount path of the Approle auth method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approle: Option<String>,
    /// Path to a PEM encoded CA certificate used to verify the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    /// Path to a PEM encoded client certificate for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
    /// Path to a PEM encoded client key for mutual TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    /// Per-request timeout (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ClientConnectionInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            approle: None,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// A versioned KV v2 secret holding one account address and its private key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretDescriptor {
    /// Secret name under the engine mount
    pub name: String,
    /// KV v2 engine mount path
    pub secret_engine: String,
    /// Secret version; 0 selects the latest version
    pub version: i64,
    /// Field holding the hex encoded account address
    #[serde(alias = "account_id")]
    pub account_field: String,
    /// Field holding the hex encoded private key
    #[serde(alias = "key_id")]
    pub key_field: String,
}

impl SecretDescriptor {
    pub fn new(
        secret_engine: impl Into<String>,
        name: impl Into<String>,
        version: i64,
        account_field: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            secret_engine: secret_engine.into(),
            version,
            account_field: account_field.into(),
            key_field: key_field.into(),
        }
    }

    /// Short identity used in logs and error messages
    pub fn identity(&self) -> String {
        format!("{}/{}@v{}", self.secret_engine, self.name, self.version)
    }
}

/// One wallet: a Vault connection plus the secrets it exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub client: ClientConnectionInfo,
    #[serde(default)]
    pub secrets: Vec<SecretDescriptor>,
}

/// When the backend re-reads secrets from Vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Wallets are built once; accounts refresh only when asked to
    #[default]
    Manual,
    /// Accounts of every open wallet are refreshed on a fixed interval
    Interval { secs: u64 },
}

impl RefreshPolicy {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RefreshPolicy::Manual => None,
            RefreshPolicy::Interval { secs } => Some(Duration::from_secs((*secs).max(1))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub wallets: Vec<WalletConfig>,
    #[serde(default)]
    pub refresh: RefreshPolicy,
}

impl BackendConfig {
    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn secret_descriptor_accepts_legacy_field_names() {
        let value = serde_json::json!({
            "name": "acct1",
            "secret_engine": "kv",
            "version": 2,
            "account_id": "addr",
            "key_id": "pk"
        });
        let parsed: SecretDescriptor = serde_json::from_value(value).expect("parse secret");
        assert_eq!(parsed.account_field, "addr");
        assert_eq!(parsed.key_field, "pk");
        assert_eq!(parsed.identity(), "kv/acct1@v2");
    }

    #[test]
    fn backend_config_defaults() {
        let parsed = BackendConfig::from_json(r#"{"wallets": []}"#).expect("parse config");
        assert_eq!(parsed.refresh, RefreshPolicy::Manual);
        assert!(parsed.refresh.interval().is_none());
    }

    #[test]
    fn backend_config_interval_refresh() {
        let parsed = BackendConfig::from_json(
            r#"{"wallets": [], "refresh": {"mode": "interval", "secs": 15}}"#,
        )
        .expect("parse config");
        assert_eq!(parsed.refresh.interval(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn backend_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "wallets": [{{
                    "client": {{"url": "http://127.0.0.1:8200", "timeout_secs": 5}},
                    "secrets": [{{
                        "name": "acct1", "secret_engine": "secret", "version": 1,
                        "account_field": "address", "key_field": "key"
                    }}]
                }}]
            }}"#
        )
        .unwrap();

        let parsed = BackendConfig::from_file(file.path()).unwrap();
        assert_eq!(parsed.wallets.len(), 1);
        let wallet = &parsed.wallets[0];
        assert_eq!(wallet.client.url, "http://127.0.0.1:8200");
        assert_eq!(wallet.client.timeout(), Duration::from_secs(5));
        assert!(wallet.client.approle.is_none());
        assert_eq!(wallet.secrets[0].secret_engine, "secret");
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = BackendConfig::from_file("/nonexistent/vault-signer.json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
