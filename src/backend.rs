//! Collection of Vault wallets built from configuration
//!
//! Wallets are built once. A config entry that cannot become a wallet is
//! logged and skipped so the others still load.

use crate::config::env::{process_env, EnvLookup};
use crate::config::{BackendConfig, RefreshPolicy, WalletConfig};
use crate::events::{EventFeed, Subscription, WalletEvent, WalletEventKind};
use crate::store::{HttpConnector, StoreConnector};
use crate::wallet::{VaultWallet, Wallet};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Default)]
struct BackendState {
    wallets: Vec<Arc<VaultWallet>>,
    refresh_task: Option<JoinHandle<()>>,
}

/// Owns the wallets of every configured Vault and their event feed
pub struct VaultBackend {
    configs: Vec<WalletConfig>,
    refresh: RefreshPolicy,
    connector: Arc<dyn StoreConnector>,
    env: EnvLookup,
    events: EventFeed,
    state: RwLock<BackendState>,
}

impl VaultBackend {
    /// Backend talking to Vault over HTTP, with credentials from the environment
    pub fn new(config: BackendConfig) -> Self {
        Self::with_connector(config, Arc::new(HttpConnector), process_env())
    }

    pub fn with_connector(
        config: BackendConfig,
        connector: Arc<dyn StoreConnector>,
        env: EnvLookup,
    ) -> Self {
        let mut backend = Self {
            configs: config.wallets,
            refresh: config.refresh,
            connector,
            env,
            events: EventFeed::new(),
            state: RwLock::new(BackendState::default()),
        };
        let wallets = backend.build_wallets();
        backend.state.get_mut().wallets = wallets;
        backend
    }

    fn build_wallets(&self) -> Vec<Arc<VaultWallet>> {
        let mut wallets = Vec::with_capacity(self.configs.len());

        for (position, config) in self.configs.iter().enumerate() {
            let wallet = VaultWallet::with_env(
                config.clone(),
                Arc::clone(&self.connector),
                self.events.clone(),
                Arc::clone(&self.env),
            )
            .and_then(|wallet| {
                // Fail early on unusable TLS material or addresses
                self.connector.connect(&config.client)?;
                Ok(wallet)
            });

            match wallet {
                Ok(wallet) => {
                    tracing::info!(wallet = %wallet.url(), secrets = wallet.secrets().len(), "Loaded Vault wallet");
                    self.events.send(Arc::clone(&wallet), WalletEventKind::Arrived);
                    wallets.push(wallet);
                }
                Err(e) => {
                    tracing::warn!(
                        position,
                        url = %config.client.url,
                        error = %e,
                        "Unable to create Vault wallet, skipping"
                    );
                }
            }
        }

        wallets
    }

    /// Build the wallets if none exist yet
    pub async fn refresh_wallets(&self) {
        let mut state = self.state.write().await;
        if state.wallets.is_empty() {
            state.wallets = self.build_wallets();
        }
    }

    /// Wallets as of the last build
    pub async fn wallets(&self) -> Vec<Arc<VaultWallet>> {
        self.state.read().await.wallets.clone()
    }

    /// Receive wallet events
    ///
    /// Every wallet already in the backend is reported first as `Arrived`.
    /// With an interval refresh policy the first subscription also starts
    /// the background account refresh.
    pub async fn subscribe(&self) -> Subscription {
        let mut state = self.state.write().await;
        let arrived = state
            .wallets
            .iter()
            .map(|wallet| WalletEvent {
                wallet: Arc::clone(wallet),
                kind: WalletEventKind::Arrived,
            })
            .collect();
        let subscription = self.events.subscribe_with(arrived);

        if let Some(period) = self.refresh.interval() {
            let running = state
                .refresh_task
                .as_ref()
                .is_some_and(|task| !task.is_finished());
            if !running {
                tracing::debug!(period_secs = period.as_secs(), "Starting account refresh loop");
                state.refresh_task = Some(spawn_refresh_loop(state.wallets.clone(), period));
            }
        }

        subscription
    }

    pub fn events(&self) -> &EventFeed {
        &self.events
    }

    /// Stop refreshing, close every wallet and drop them from the backend
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if let Some(task) = state.refresh_task.take() {
            task.abort();
        }

        let wallets = std::mem::take(&mut state.wallets);
        let closed = join_all(wallets.iter().map(|wallet| wallet.close())).await;
        for (wallet, result) in wallets.into_iter().zip(closed) {
            if let Err(e) = result {
                tracing::warn!(wallet = %wallet.url(), error = %e, "Error closing wallet");
            }
            self.events.send(wallet, WalletEventKind::Dropped);
        }
    }
}

impl Drop for VaultBackend {
    fn drop(&mut self) {
        if let Some(task) = self.state.get_mut().refresh_task.take() {
            task.abort();
        }
    }
}

fn spawn_refresh_loop(wallets: Vec<Arc<VaultWallet>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            join_all(wallets.iter().map(|wallet| async move {
                if !wallet.is_open().await {
                    return;
                }
                if let Err(e) = wallet.refresh_accounts().await {
                    tracing::warn!(wallet = %wallet.url(), error = %e, "Account refresh failed");
                }
            }))
            .await;
        }
    })
}
