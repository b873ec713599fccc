//! Wallet over one Vault server
//!
//! SECURITY: the wallet keeps only addresses and secret locations. Private
//! keys are read from Vault per signing call and zeroed before it returns.
//!
//! One `RwLock` guards the session, the account list and the account index
//! together. Open, Close and refresh take it exclusively and hold it across
//! their Vault calls, so a slow Vault serialises those operations on this
//! wallet. Status, account queries and signing share it.

use super::account::{locator_url, parse_address, Account};
use super::keys;
use super::signer::{self, SignedTransaction, UnsignedTransaction};
use super::{DerivationPath, Wallet, WalletStatus};
use crate::config::env::{process_env, Credentials, EnvLookup};
use crate::config::{ClientConnectionInfo, SecretDescriptor, WalletConfig};
use crate::events::{EventFeed, WalletEventKind};
use crate::store::{ApproleLogin, SecretFields, StoreClient, StoreConnector};
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::{Address, ChainId, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use url::Url;
use zeroize::Zeroize;

/// Authenticated handle to Vault; exists only while the wallet is open
struct WalletSession {
    client: Arc<dyn StoreClient>,
    token: Option<SecretString>,
}

#[derive(Default)]
struct WalletState {
    session: Option<WalletSession>,
    accounts: Vec<Account>,
    index: HashMap<Address, SecretDescriptor>,
}

impl WalletState {
    fn contains(&self, account: &Account) -> bool {
        self.accounts.iter().any(|a| a.matches(account))
    }
}

/// Wallet exposing the keys of a fixed set of Vault secrets as accounts
pub struct VaultWallet {
    me: Weak<VaultWallet>,
    url: Url,
    client_info: ClientConnectionInfo,
    secrets: Vec<SecretDescriptor>,
    connector: Arc<dyn StoreConnector>,
    env: EnvLookup,
    events: EventFeed,
    state: RwLock<WalletState>,
}

impl VaultWallet {
    /// Create a closed wallet reading credentials from the process environment
    pub fn new(
        config: WalletConfig,
        connector: Arc<dyn StoreConnector>,
        events: EventFeed,
    ) -> Result<Arc<Self>> {
        Self::with_env(config, connector, events, process_env())
    }

    /// Create a closed wallet resolving credentials through `env`
    pub fn with_env(
        config: WalletConfig,
        connector: Arc<dyn StoreConnector>,
        events: EventFeed,
        env: EnvLookup,
    ) -> Result<Arc<Self>> {
        let url = parse_wallet_url(&config.client.url)?;
        let WalletConfig { client, secrets } = config;

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            url,
            client_info: client,
            secrets,
            connector,
            env,
            events,
            state: RwLock::new(WalletState::default()),
        }))
    }

    pub fn secrets(&self) -> &[SecretDescriptor] {
        &self.secrets
    }

    pub async fn is_open(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    fn publish(&self, kind: WalletEventKind) {
        if let Some(wallet) = self.me.upgrade() {
            self.events.send(wallet, kind);
        }
    }

    fn format_error(&self, descriptor: &SecretDescriptor, reason: impl Into<String>) -> Error {
        Error::Format {
            wallet: self.url.to_string(),
            secret: descriptor.identity(),
            reason: reason.into(),
        }
    }

    /// Re-read every configured secret and rebuild the account list
    ///
    /// All or nothing: the first secret that fails to resolve aborts the
    /// refresh and the previous accounts stay in place.
    pub async fn refresh_accounts(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state.session.as_ref().ok_or(Error::WalletClosed)?;

        let mut accounts = Vec::with_capacity(self.secrets.len());
        let mut index = HashMap::with_capacity(self.secrets.len());

        for descriptor in &self.secrets {
            let account = self.resolve_account(session, descriptor).await?;
            index.insert(account.address, descriptor.clone());
            accounts.push(account);
        }

        tracing::debug!(wallet = %self.url, accounts = accounts.len(), "Refreshed accounts");
        state.accounts = accounts;
        state.index = index;
        Ok(())
    }

    async fn resolve_account(
        &self,
        session: &WalletSession,
        descriptor: &SecretDescriptor,
    ) -> Result<Account> {
        let request = descriptor.to_request(self.url.as_str())?;

        let fields = session
            .client
            .read_secret(session.token.as_ref(), &request)
            .await?
            .ok_or_else(|| self.format_error(descriptor, "no secret found in vault"))?;

        let value = fields.get(&descriptor.account_field).ok_or_else(|| {
            self.format_error(descriptor, "no value found in vault with provided account field")
        })?;
        let value = value.as_str().ok_or_else(|| {
            self.format_error(descriptor, "account field value in vault is not plain string")
        })?;
        let address = parse_address(value).ok_or_else(|| {
            self.format_error(descriptor, "account field value in vault is not a hex address")
        })?;

        let url = locator_url(&self.client_info.url, &request.path, descriptor.version)
            .map_err(|e| self.format_error(descriptor, format!("unable to create account URL: {}", e)))?;

        Ok(Account::new(address, url))
    }

    /// The secret behind `account`, if the wallet manages it
    fn lookup<'a>(state: &'a WalletState, account: &Account) -> Result<&'a SecretDescriptor> {
        if !state.contains(account) {
            return Err(Error::UnknownAccount);
        }
        state.index.get(&account.address).ok_or(Error::UnknownAccount)
    }

    /// Write a key and its address to the secret described by `descriptor`
    async fn store_key(
        &self,
        descriptor: &SecretDescriptor,
        signer: &PrivateKeySigner,
    ) -> Result<Address> {
        let state = self.state.read().await;
        let session = state.session.as_ref().ok_or(Error::WalletClosed)?;

        let address = signer.address();
        let mut key_bytes = signer.to_bytes();

        let mut fields = SecretFields::default();
        fields.insert(descriptor.account_field.clone(), hex::encode(address));
        fields.insert(descriptor.key_field.clone(), hex::encode(key_bytes));
        key_bytes.0.zeroize();

        session
            .client
            .write_secret(session.token.as_ref(), &descriptor.data_path(), &fields)
            .await?;

        tracing::info!(wallet = %self.url, secret = %descriptor.identity(), %address, "Stored new key");
        Ok(address)
    }
}

fn parse_wallet_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.host().is_none() {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

#[async_trait]
impl Wallet for VaultWallet {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn status(&self) -> Result<WalletStatus> {
        let state = self.state.read().await;
        let Some(session) = &state.session else {
            return Ok(WalletStatus::Closed);
        };

        let health = session
            .client
            .health()
            .await
            .map_err(Error::HealthCheckFailed)?;

        if !health.initialized {
            return Err(Error::StoreDegraded {
                status: WalletStatus::Uninitialised,
                initialized: health.initialized,
                sealed: health.sealed,
            });
        }
        if health.sealed {
            return Err(Error::StoreDegraded {
                status: WalletStatus::Sealed,
                initialized: health.initialized,
                sealed: health.sealed,
            });
        }
        Ok(WalletStatus::Open)
    }

    /// Authenticate with Vault
    ///
    /// Approle credentials from the environment are exchanged for a token;
    /// otherwise `VAULT_TOKEN` is used as is. No secrets are read here.
    async fn open(&self, _passphrase: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.session.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let credentials = Credentials::resolve(&*self.env, self.client_info.approle.as_deref())?;
        let client = self.connector.connect(&self.client_info)?;

        let token = match credentials {
            Credentials::Approle {
                path,
                role_id,
                secret_id,
            } => {
                let token = client
                    .authenticate(ApproleLogin {
                        path: &path,
                        role_id: &role_id,
                        secret_id: &secret_id,
                    })
                    .await?;
                tracing::info!(wallet = %self.url, approle_path = %path, "Authenticated with Approle");
                Some(token)
            }
            Credentials::Token(token) => Some(token),
            Credentials::Anonymous => {
                tracing::warn!(wallet = %self.url, "No Vault credentials in environment");
                None
            }
        };

        state.session = Some(WalletSession { client, token });
        drop(state);

        self.publish(WalletEventKind::Opened);
        Ok(())
    }

    /// Drop the session and forget every account
    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.session.is_none() {
            return Ok(());
        }

        *state = WalletState::default();
        drop(state);

        tracing::info!(wallet = %self.url, "Closed wallet");
        self.publish(WalletEventKind::Closed);
        Ok(())
    }

    /// Accounts found by the last successful refresh
    async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }

    async fn contains(&self, account: &Account) -> bool {
        self.state.read().await.contains(account)
    }

    fn derive(&self, _path: &DerivationPath, _pin: bool) -> Result<Account> {
        Err(Error::NotSupported)
    }

    fn self_derive(&self, _bases: &[&DerivationPath]) {
        tracing::warn!(wallet = %self.url, "SelfDerive is not supported for Vault wallets");
    }

    async fn sign_hash(&self, account: &Account, hash: &B256) -> Result<Signature> {
        let state = self.state.read().await;
        let session = state.session.as_ref().ok_or(Error::WalletClosed)?;
        let descriptor = Self::lookup(&state, account)?;

        let key = keys::fetch_key(
            &*session.client,
            session.token.as_ref(),
            self.url.as_str(),
            descriptor,
        )
        .await?;
        key.with_signer(|key| signer::sign_hash(key, hash))
    }

    async fn sign_tx(
        &self,
        account: &Account,
        tx: UnsignedTransaction,
        chain_id: Option<ChainId>,
    ) -> Result<SignedTransaction> {
        let state = self.state.read().await;
        let session = state.session.as_ref().ok_or(Error::WalletClosed)?;
        let descriptor = Self::lookup(&state, account)?;

        let key = keys::fetch_key(
            &*session.client,
            session.token.as_ref(),
            self.url.as_str(),
            descriptor,
        )
        .await?;
        key.with_signer(|key| signer::sign_transaction(key, tx, chain_id))
    }
}

impl std::fmt::Debug for VaultWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultWallet")
            .field("url", &self.url.as_str())
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

/// Generate a new key and store it in the first secret of `config`
///
/// The address is written without `0x`, the key as plain hex.
pub async fn generate_and_store(
    config: &WalletConfig,
    connector: Arc<dyn StoreConnector>,
) -> Result<Address> {
    generate_and_store_with_env(config, connector, process_env()).await
}

pub(crate) async fn generate_and_store_with_env(
    config: &WalletConfig,
    connector: Arc<dyn StoreConnector>,
    env: EnvLookup,
) -> Result<Address> {
    let descriptor = config
        .secrets
        .first()
        .cloned()
        .ok_or_else(|| Error::Config("wallet has no secrets configured".to_string()))?;

    let wallet = VaultWallet::with_env(config.clone(), connector, EventFeed::new(), env)?;
    wallet.open("").await?;

    let result = async {
        let status = wallet.status().await?;
        if status != WalletStatus::Open {
            return Err(Error::Config(format!("unable to use Vault: {}", status)));
        }
        let signer = PrivateKeySigner::random();
        wallet.store_key(&descriptor, &signer).await
    }
    .await;

    wallet.close().await?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::env_vars;
    use crate::store::MemoryStore;
    use alloy::consensus::TxLegacy;
    use alloy::primitives::{keccak256, TxKind, U256};

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDR: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const OTHER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const OTHER_ADDR: &str = "70997970c51812dc3a010c7d01b50e0d17dc79c8";
    const VAULT_URL: &str = "http://127.0.0.1:8200";

    fn env(vars: &[(&str, &str)]) -> EnvLookup {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key| vars.get(key).cloned())
    }

    fn secret(name: &str) -> SecretDescriptor {
        SecretDescriptor::new("secret", name, 1, "address", "key")
    }

    fn config(secrets: Vec<SecretDescriptor>) -> WalletConfig {
        WalletConfig {
            client: ClientConnectionInfo::new(VAULT_URL),
            secrets,
        }
    }

    async fn store_with_accounts() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put("secret/data/acct1", &[("address", TEST_ADDR), ("key", TEST_KEY)])
            .await;
        store
            .put("secret/data/acct2", &[("address", OTHER_ADDR), ("key", OTHER_KEY)])
            .await;
        store
    }

    fn new_wallet(store: &MemoryStore, secrets: Vec<SecretDescriptor>) -> Arc<VaultWallet> {
        VaultWallet::with_env(
            config(secrets),
            Arc::new(store.clone()),
            EventFeed::new(),
            env(&[]),
        )
        .unwrap()
    }

    fn addr(s: &str) -> Address {
        parse_address(s).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_sign_hash() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);

        wallet.open("ignored").await.unwrap();
        wallet.refresh_accounts().await.unwrap();

        let accounts = wallet.accounts().await;
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].address, addr(TEST_ADDR));
        assert_eq!(
            accounts[0].url.as_ref().unwrap().as_str(),
            "http://127.0.0.1:8200/v1/secret/data/acct1?version=1"
        );

        let hash = keccak256(b"vault");
        let signature = wallet.sign_hash(&accounts[0], &hash).await.unwrap();
        assert_eq!(signature.as_bytes().len(), crate::wallet::SIGNATURE_LENGTH);
        assert_eq!(
            signature.recover_address_from_prehash(&hash).unwrap(),
            addr(TEST_ADDR)
        );
    }

    #[tokio::test]
    async fn test_open_twice_and_close_idempotent() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);

        assert!(wallet.close().await.is_ok());
        wallet.open("").await.unwrap();
        assert!(matches!(wallet.open("").await, Err(Error::AlreadyOpen)));
        wallet.close().await.unwrap();
        wallet.close().await.unwrap();
        assert!(!wallet.is_open().await);
    }

    #[tokio::test]
    async fn test_close_discards_accounts() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();
        let account = wallet.accounts().await.remove(0);

        wallet.close().await.unwrap();
        assert!(wallet.accounts().await.is_empty());
        assert!(!wallet.contains(&account).await);
        assert!(matches!(
            wallet.sign_hash(&account, &B256::ZERO).await,
            Err(Error::WalletClosed)
        ));
    }

    #[tokio::test]
    async fn test_status() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        assert_eq!(wallet.status().await.unwrap(), WalletStatus::Closed);

        wallet.open("").await.unwrap();
        assert_eq!(wallet.status().await.unwrap(), WalletStatus::Open);

        store.set_health(true, true).await;
        let err = wallet.status().await.unwrap_err();
        assert_eq!(err.status(), Some(WalletStatus::Sealed));
        assert_eq!(
            err.status().unwrap().to_string(),
            "Vault sealed"
        );

        store.set_health(false, true).await;
        let err = wallet.status().await.unwrap_err();
        assert_eq!(err.status(), Some(WalletStatus::Uninitialised));

        store.set_health_unreachable(true).await;
        let err = wallet.status().await.unwrap_err();
        assert!(matches!(err, Error::HealthCheckFailed(_)));
        assert_eq!(err.status(), Some(WalletStatus::HealthCheckFailed));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();

        let stranger = Account::from_address(addr(OTHER_ADDR));
        assert!(matches!(
            wallet.sign_hash(&stranger, &B256::ZERO).await,
            Err(Error::UnknownAccount)
        ));

        // Right address, wrong location
        let misplaced = Account::new(
            addr(TEST_ADDR),
            locator_url(VAULT_URL, "secret/data/acct2", 1).unwrap(),
        );
        assert!(!wallet.contains(&misplaced).await);
        assert!(matches!(
            wallet.sign_hash(&misplaced, &B256::ZERO).await,
            Err(Error::UnknownAccount)
        ));

        // Address only matches regardless of location
        assert!(wallet.contains(&Account::from_address(addr(TEST_ADDR))).await);
    }

    #[tokio::test]
    async fn test_refresh_is_all_or_nothing() {
        let store = store_with_accounts().await;
        store
            .put("secret/data/acct3", &[("address", TEST_ADDR), ("key", TEST_KEY)])
            .await;
        let wallet = new_wallet(&store, vec![secret("acct1"), secret("acct2"), secret("acct3")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();
        let before = wallet.accounts().await;
        assert_eq!(before.len(), 3);

        store.fail_path("secret/data/acct2").await;
        let err = wallet.refresh_accounts().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(wallet.accounts().await, before);

        // Index untouched: signing still resolves through the old entries
        let account = Account::from_address(addr(TEST_ADDR));
        assert!(wallet.sign_hash(&account, &B256::ZERO).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_format_errors() {
        let store = MemoryStore::new();
        let mut fields = serde_json::Map::new();
        fields.insert("address".to_string(), serde_json::json!(12345));
        store.put_raw("secret/data/numeric", fields).await;
        store
            .put("secret/data/bad_hex", &[("address", "0x1234"), ("key", TEST_KEY)])
            .await;
        store.put("secret/data/no_address", &[("key", TEST_KEY)]).await;

        for name in ["numeric", "bad_hex", "no_address", "missing"] {
            let wallet = new_wallet(&store, vec![secret(name)]);
            wallet.open("").await.unwrap();
            let err = wallet.refresh_accounts().await.unwrap_err();
            match err {
                Error::Format { wallet, secret, .. } => {
                    assert_eq!(wallet, "http://127.0.0.1:8200/");
                    assert_eq!(secret, format!("secret/{}@v1", name));
                }
                other => panic!("expected format error for {name}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_refresh_invalid_descriptor() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(
            &store,
            vec![SecretDescriptor::new("secret", "acct1", -1, "address", "key")],
        );
        wallet.open("").await.unwrap();
        match wallet.refresh_accounts().await.unwrap_err() {
            Error::InvalidDescriptor {
                wallet,
                secret,
                version,
            } => {
                assert_eq!(wallet, "http://127.0.0.1:8200/");
                assert_eq!(secret, "secret/acct1@v-1");
                assert_eq!(version, -1);
            }
            other => panic!("expected invalid descriptor, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_string_key_is_format_error() {
        let store = MemoryStore::new();
        let mut fields = serde_json::Map::new();
        fields.insert("address".to_string(), serde_json::json!(TEST_ADDR));
        fields.insert("key".to_string(), serde_json::json!(12345));
        store.put_raw("secret/data/acct1", fields).await;

        let wallet = new_wallet(&store, vec![secret("acct1")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();

        let account = Account::from_address(addr(TEST_ADDR));
        match wallet.sign_hash(&account, &B256::ZERO).await.unwrap_err() {
            Error::Format { wallet, secret, .. } => {
                assert_eq!(wallet, "http://127.0.0.1:8200/");
                assert_eq!(secret, "secret/acct1@v1");
            }
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_requires_open_wallet() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        assert!(matches!(
            wallet.refresh_accounts().await,
            Err(Error::WalletClosed)
        ));
    }

    #[tokio::test]
    async fn test_key_zeroed_after_signing() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();
        let account = Account::from_address(addr(TEST_ADDR));

        keys::drop_log::take();
        wallet.sign_hash(&account, &B256::ZERO).await.unwrap();
        assert_eq!(keys::drop_log::take(), vec![true]);

        let tx = UnsignedTransaction::public(TxLegacy {
            gas_limit: 21_000,
            to: TxKind::Call(addr(OTHER_ADDR)),
            value: U256::from(1u64),
            ..Default::default()
        });
        wallet.sign_tx(&account, tx, Some(1)).await.unwrap();
        assert_eq!(keys::drop_log::take(), vec![true]);

        // Corrupt the key after refresh: parsing fails past retrieval
        store
            .put(
                "secret/data/acct1",
                &[("address", TEST_ADDR), ("key", "0xac0974bec39a17e3zz")],
            )
            .await;
        let pinned = new_wallet(&store, vec![SecretDescriptor::new("secret", "acct1", 0, "address", "key")]);
        pinned.open("").await.unwrap();
        pinned.refresh_accounts().await.unwrap();
        let err = pinned.sign_hash(&account, &B256::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::KeyParse(_)));
        assert_eq!(keys::drop_log::take(), vec![true]);
    }

    #[tokio::test]
    async fn test_missing_key_field_is_unknown_account() {
        let store = MemoryStore::new();
        store.put("secret/data/acct1", &[("address", TEST_ADDR)]).await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();

        let account = Account::from_address(addr(TEST_ADDR));
        assert!(matches!(
            wallet.sign_hash(&account, &B256::ZERO).await,
            Err(Error::UnknownAccount)
        ));
    }

    #[tokio::test]
    async fn test_sign_tx_schemes() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();
        let account = Account::from_address(addr(TEST_ADDR));

        let tx = TxLegacy {
            nonce: 3,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(addr(OTHER_ADDR)),
            value: U256::from(10u64),
            ..Default::default()
        };

        let eip155 = wallet
            .sign_tx(&account, UnsignedTransaction::public(tx.clone()), Some(10))
            .await
            .unwrap();
        assert_eq!(eip155.signed.tx().chain_id, Some(10));
        assert_eq!(eip155.signed.recover_signer().unwrap(), addr(TEST_ADDR));

        let private = wallet
            .sign_tx_with_passphrase(&account, "ignored", UnsignedTransaction::private(tx.clone()), Some(10))
            .await
            .unwrap();
        assert_eq!(private.signed.tx().chain_id, None);

        let legacy = wallet
            .sign_tx(&account, UnsignedTransaction::public(tx), None)
            .await
            .unwrap();
        assert_eq!(legacy.signed.tx().chain_id, None);
        assert_eq!(legacy.signed.recover_signer().unwrap(), addr(TEST_ADDR));
    }

    #[tokio::test]
    async fn test_approle_partial_env_fails() {
        let store = store_with_accounts().await;
        let wallet = VaultWallet::with_env(
            config(vec![secret("acct1")]),
            Arc::new(store.clone()),
            EventFeed::new(),
            env(&[(env_vars::VAULT_ROLE_ID, "role")]),
        )
        .unwrap();

        assert!(matches!(wallet.open("").await, Err(Error::AuthConfig(_))));
        assert!(!wallet.is_open().await);
        assert_eq!(store.login_count(), 0);
    }

    #[tokio::test]
    async fn test_approle_login_issues_session_token() {
        let store = store_with_accounts().await;
        store.add_approle("role", "secret", "s.session").await;
        store.require_token("s.session").await;

        let wallet = VaultWallet::with_env(
            config(vec![secret("acct1")]),
            Arc::new(store.clone()),
            EventFeed::new(),
            env(&[
                (env_vars::VAULT_ROLE_ID, "role"),
                (env_vars::VAULT_SECRET_ID, "secret"),
            ]),
        )
        .unwrap();

        wallet.open("").await.unwrap();
        assert_eq!(store.login_count(), 1);
        wallet.refresh_accounts().await.unwrap();
        assert_eq!(wallet.accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ambient_token_used_without_approle() {
        let store = store_with_accounts().await;
        store.require_token("s.ambient").await;

        let wallet = VaultWallet::with_env(
            config(vec![secret("acct1")]),
            Arc::new(store.clone()),
            EventFeed::new(),
            env(&[(env_vars::VAULT_TOKEN, "s.ambient")]),
        )
        .unwrap();

        wallet.open("").await.unwrap();
        assert_eq!(store.login_count(), 0);
        wallet.refresh_accounts().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_and_close_publish_events() {
        let store = store_with_accounts().await;
        let feed = EventFeed::new();
        let mut subscription = feed.subscribe();
        let wallet = VaultWallet::with_env(
            config(vec![secret("acct1")]),
            Arc::new(store.clone()),
            feed,
            env(&[]),
        )
        .unwrap();

        wallet.open("").await.unwrap();
        wallet.close().await.unwrap();
        wallet.close().await.unwrap();

        let opened = subscription.try_recv().unwrap();
        assert_eq!(opened.kind, WalletEventKind::Opened);
        assert!(Arc::ptr_eq(&opened.wallet, &wallet));
        assert_eq!(subscription.try_recv().unwrap().kind, WalletEventKind::Closed);
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_derive_not_supported() {
        let store = MemoryStore::new();
        let wallet = new_wallet(&store, vec![]);
        assert!(matches!(
            wallet.derive(&[44, 60, 0, 0, 0], false),
            Err(Error::NotSupported)
        ));
        let base: &[u32] = &[44, 60, 0, 0];
        wallet.self_derive(&[base]);
    }

    #[tokio::test]
    async fn test_invalid_wallet_url() {
        for url in ["not a url", "localhost:8200", ""] {
            let result = VaultWallet::with_env(
                WalletConfig {
                    client: ClientConnectionInfo::new(url),
                    secrets: vec![],
                },
                Arc::new(MemoryStore::new()),
                EventFeed::new(),
                env(&[]),
            );
            assert!(matches!(result, Err(Error::InvalidUrl { .. })), "{url}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sign_and_close() {
        let store = store_with_accounts().await;
        let wallet = new_wallet(&store, vec![secret("acct1"), secret("acct2")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let wallet = Arc::clone(&wallet);
            handles.push(tokio::spawn(async move {
                let account = Account::from_address(addr(TEST_ADDR));
                wallet.sign_hash(&account, &B256::repeat_byte(i)).await
            }));
        }
        let closer = {
            let wallet = Arc::clone(&wallet);
            tokio::spawn(async move { wallet.close().await })
        };

        closer.await.unwrap().unwrap();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) | Err(Error::WalletClosed) | Err(Error::UnknownAccount) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_generate_and_store() {
        let store = MemoryStore::new();
        let cfg = config(vec![secret("fresh")]);

        let address = generate_and_store_with_env(&cfg, Arc::new(store.clone()), env(&[]))
            .await
            .unwrap();

        let stored = store.latest("secret/data/fresh").await.unwrap();
        let stored_addr = stored["address"].as_str().unwrap();
        assert!(!stored_addr.starts_with("0x"));
        assert_eq!(addr(stored_addr), address);
        assert_eq!(stored["key"].as_str().unwrap().len(), 64);

        // The stored key is usable by a wallet
        let wallet = new_wallet(&store, vec![secret("fresh")]);
        wallet.open("").await.unwrap();
        wallet.refresh_accounts().await.unwrap();
        let account = Account::from_address(address);
        let hash = keccak256(b"fresh");
        let signature = wallet.sign_hash(&account, &hash).await.unwrap();
        assert_eq!(signature.recover_address_from_prehash(&hash).unwrap(), address);
    }

    #[tokio::test]
    async fn test_generate_and_store_fails_on_sealed_vault() {
        let store = MemoryStore::new();
        store.set_health(true, true).await;
        let err = generate_and_store_with_env(
            &config(vec![secret("fresh")]),
            Arc::new(store.clone()),
            env(&[]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(WalletStatus::Sealed));
        assert!(store.latest("secret/data/fresh").await.is_none());
    }

    #[tokio::test]
    async fn test_generate_and_store_requires_secret() {
        let err = generate_and_store_with_env(&config(vec![]), Arc::new(MemoryStore::new()), env(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
