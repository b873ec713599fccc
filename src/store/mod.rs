//! Secret store adapter
//!
//! The wallets only talk to Vault through the [`StoreClient`] capability set,
//! so the HTTP implementation can be swapped for [`memory::MemoryStore`] in
//! tests.

pub mod http;
pub mod memory;

use crate::config::ClientConnectionInfo;
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroize;

pub use http::{HttpConnector, VaultHttpClient};
pub use memory::MemoryStore;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vault returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store unreachable: {0}")]
    Unreachable(String),
}

/// Result of a Vault health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreHealth {
    pub initialized: bool,
    pub sealed: bool,
}

/// Path and query of a KV v2 read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRequest {
    /// `{engine}/data/{name}`
    pub path: String,
    /// Query parameters, currently only `version`
    pub query: Vec<(String, String)>,
}

impl SecretRequest {
    pub fn version(&self) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == "version")
            .map(|(_, v)| v.as_str())
    }
}

/// Fields of a secret (`data.data` in a KV v2 response)
///
/// Every string value is zeroized when this is dropped.
#[derive(Default)]
pub struct SecretFields(Map<String, Value>);

impl SecretFields {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Move a field out, leaving the remaining fields in place
    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), Value::String(value.into()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build the KV v2 write body `{"data": {...}}`
    pub(crate) fn to_write_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("data".to_string(), Value::Object(self.0.clone()));
        Value::Object(body)
    }
}

/// Overwrite every string reachable from `value`
pub(crate) fn zeroize_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(zeroize_value),
        Value::Object(map) => map.values_mut().for_each(zeroize_value),
        _ => {}
    }
}

impl Drop for SecretFields {
    fn drop(&mut self) {
        self.0.values_mut().for_each(zeroize_value);
    }
}

impl std::fmt::Debug for SecretFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretFields")
            .field("fields", &self.0.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

/// Approle login material
pub struct ApproleLogin<'a> {
    pub path: &'a str,
    pub role_id: &'a SecretString,
    pub secret_id: &'a SecretString,
}

/// Capability set required of a secret store
///
/// `token` is the session token issued by [`StoreClient::authenticate`] or
/// taken from the environment; `None` sends unauthenticated requests.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Initialisation and seal state of the store
    async fn health(&self) -> Result<StoreHealth, StoreError>;

    /// Read the fields of a secret, `Ok(None)` if it does not exist
    async fn read_secret(
        &self,
        token: Option<&SecretString>,
        request: &SecretRequest,
    ) -> Result<Option<SecretFields>, StoreError>;

    /// Write a new version of the secret at `path`
    async fn write_secret(
        &self,
        token: Option<&SecretString>,
        path: &str,
        fields: &SecretFields,
    ) -> Result<(), StoreError>;

    /// Exchange Approle credentials for a session token
    async fn authenticate(&self, login: ApproleLogin<'_>) -> Result<SecretString, StoreError>;
}

/// Builds store clients bound to a wallet's connection info
pub trait StoreConnector: Send + Sync {
    fn connect(&self, info: &ClientConnectionInfo) -> Result<Arc<dyn StoreClient>, StoreError>;
}
