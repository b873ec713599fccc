//! In-memory secret store
//!
//! Behaves like a KV v2 engine with Approle auth, without any network.
//! Used by the test suites and handy for local experiments.

use super::{
    ApproleLogin, SecretFields, SecretRequest, StoreClient, StoreConnector, StoreError,
    StoreHealth,
};
use crate::config::ClientConnectionInfo;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    /// path -> version -> fields
    secrets: HashMap<String, BTreeMap<u64, Map<String, Value>>>,
    health: StoreHealth,
    /// (role_id, secret_id) -> token issued on login
    approles: HashMap<(String, String), String>,
    /// When set, reads and writes must carry this token
    required_token: Option<String>,
    failing_paths: HashSet<String>,
    health_unreachable: bool,
}

/// Shared in-memory store; clones see the same data
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    /// Read synchronously by [`StoreConnector::connect`]
    refused_urls: Arc<Mutex<HashSet<String>>>,
    logins: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An initialised, unsealed store with no secrets
    pub fn new() -> Self {
        let state = State {
            health: StoreHealth {
                initialized: true,
                sealed: false,
            },
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            refused_urls: Arc::new(Mutex::new(HashSet::new())),
            logins: Arc::new(AtomicUsize::new(0)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Store a new version of the secret at `path`, returning its version
    pub async fn put(&self, path: &str, fields: &[(&str, &str)]) -> u64 {
        let map = fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        self.put_raw(path, map).await
    }

    /// Like [`MemoryStore::put`] but with arbitrary JSON values
    pub async fn put_raw(&self, path: &str, fields: Map<String, Value>) -> u64 {
        let mut state = self.state.write().await;
        let versions = state.secrets.entry(path.to_string()).or_default();
        let version = versions.keys().next_back().copied().unwrap_or(0) + 1;
        versions.insert(version, fields);
        version
    }

    /// Latest stored fields at `path`
    pub async fn latest(&self, path: &str) -> Option<Map<String, Value>> {
        let state = self.state.read().await;
        state
            .secrets
            .get(path)
            .and_then(|versions| versions.values().next_back().cloned())
    }

    pub async fn set_health(&self, initialized: bool, sealed: bool) {
        self.state.write().await.health = StoreHealth {
            initialized,
            sealed,
        };
    }

    /// Make health checks fail as if the store were unreachable
    pub async fn set_health_unreachable(&self, unreachable: bool) {
        self.state.write().await.health_unreachable = unreachable;
    }

    /// Accept an Approle login with these credentials, issuing `token`
    pub async fn add_approle(&self, role_id: &str, secret_id: &str, token: &str) {
        self.state
            .write()
            .await
            .approles
            .insert((role_id.to_string(), secret_id.to_string()), token.to_string());
    }

    /// Require every read and write to present `token`
    pub async fn require_token(&self, token: &str) {
        self.state.write().await.required_token = Some(token.to_string());
    }

    /// Make reads of `path` fail with a transport error
    pub async fn fail_path(&self, path: &str) {
        self.state.write().await.failing_paths.insert(path.to_string());
    }

    /// Make [`StoreConnector::connect`] fail for `url`
    pub async fn refuse_url(&self, url: &str) {
        self.refused().insert(url.to_string());
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn refused(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.refused_urls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_token(state: &State, token: Option<&SecretString>) -> Result<(), StoreError> {
        match &state.required_token {
            Some(required) if token.map(|t| t.expose_secret()) != Some(required.as_str()) => {
                Err(StoreError::Status {
                    status: 403,
                    message: "permission denied".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn health(&self) -> Result<StoreHealth, StoreError> {
        let state = self.state.read().await;
        if state.health_unreachable {
            return Err(StoreError::Unreachable("connection refused".to_string()));
        }
        Ok(state.health)
    }

    async fn read_secret(
        &self,
        token: Option<&SecretString>,
        request: &SecretRequest,
    ) -> Result<Option<SecretFields>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Self::check_token(&state, token)?;

        if state.failing_paths.contains(&request.path) {
            return Err(StoreError::Unreachable(format!(
                "read of {} failed",
                request.path
            )));
        }

        let version: u64 = request
            .version()
            .unwrap_or("0")
            .parse()
            .map_err(|_| StoreError::Status {
                status: 400,
                message: "invalid version".to_string(),
            })?;

        let Some(versions) = state.secrets.get(&request.path) else {
            return Ok(None);
        };
        let fields = if version == 0 {
            versions.values().next_back()
        } else {
            versions.get(&version)
        };

        Ok(fields.cloned().map(SecretFields::new))
    }

    async fn write_secret(
        &self,
        token: Option<&SecretString>,
        path: &str,
        fields: &SecretFields,
    ) -> Result<(), StoreError> {
        {
            let state = self.state.read().await;
            Self::check_token(&state, token)?;
        }
        self.put_raw(path, fields.0.clone()).await;
        Ok(())
    }

    async fn authenticate(&self, login: ApproleLogin<'_>) -> Result<SecretString, StoreError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        let key = (
            login.role_id.expose_secret().to_string(),
            login.secret_id.expose_secret().to_string(),
        );
        match state.approles.get(&key) {
            Some(token) => Ok(SecretString::from(token.clone())),
            None => Err(StoreError::Status {
                status: 400,
                message: "invalid role or secret ID".to_string(),
            }),
        }
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self, info: &ClientConnectionInfo) -> Result<Arc<dyn StoreClient>, StoreError> {
        if self.refused().contains(&info.url) {
            return Err(StoreError::Unreachable(format!("{} refused", info.url)));
        }
        Ok(Arc::new(self.clone()))
    }
}
