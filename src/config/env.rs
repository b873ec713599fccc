//! Vault credentials from the process environment
//!
//! Resolved every time a wallet is opened:
//! 1. `VAULT_ROLE_ID` + `VAULT_SECRET_ID` - Approle login (preferred)
//! 2. `VAULT_TOKEN` - an already issued token
//! 3. Nothing - requests are sent unauthenticated
//!
//! Setting only one of the two Approle variables is an error rather than a
//! silent fallback to the token.
//!
//! ```bash
//! export VAULT_ROLE_ID="..."
//! export VAULT_SECRET_ID="..."
//! # Optional, defaults to the configured mount or "approle"
//! export VAULT_APPROLE_PATH="approle"
//! ```

use crate::{Error, Result};
use secrecy::SecretString;
use std::sync::Arc;

/// Environment variable names
pub mod env_vars {
    pub const VAULT_ROLE_ID: &str = "VAULT_ROLE_ID";
    pub const VAULT_SECRET_ID: &str = "VAULT_SECRET_ID";
    pub const VAULT_APPROLE_PATH: &str = "VAULT_APPROLE_PATH";
    pub const VAULT_TOKEN: &str = "VAULT_TOKEN";
}

/// Mount path used when neither the environment nor the config names one
pub const DEFAULT_APPROLE_PATH: &str = "approle";

/// Looks up a single environment variable
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the real process environment
pub fn process_env() -> EnvLookup {
    Arc::new(|key| std::env::var(key).ok())
}

/// How a wallet authenticates when it is opened
#[derive(Debug)]
pub enum Credentials {
    /// Exchange a role id and secret id for a session token
    Approle {
        path: String,
        role_id: SecretString,
        secret_id: SecretString,
    },
    /// Use an already issued token
    Token(SecretString),
    /// No credentials available
    Anonymous,
}

impl Credentials {
    /// Resolve credentials through `lookup`
    ///
    /// `configured_path` is the Approle mount from the wallet config; the
    /// `VAULT_APPROLE_PATH` variable takes priority over it.
    pub fn resolve(
        lookup: &(dyn Fn(&str) -> Option<String> + Send + Sync),
        configured_path: Option<&str>,
    ) -> Result<Self> {
        let role_id = lookup(env_vars::VAULT_ROLE_ID);
        let secret_id = lookup(env_vars::VAULT_SECRET_ID);

        match (role_id, secret_id) {
            (Some(role_id), Some(secret_id)) => {
                let path = lookup(env_vars::VAULT_APPROLE_PATH)
                    .or_else(|| configured_path.map(str::to_string))
                    .unwrap_or_else(|| DEFAULT_APPROLE_PATH.to_string());
                tracing::debug!(approle_path = %path, "Using Approle credentials");
                Ok(Credentials::Approle {
                    path,
                    role_id: SecretString::from(role_id),
                    secret_id: SecretString::from(secret_id),
                })
            }
            (None, None) => match lookup(env_vars::VAULT_TOKEN) {
                Some(token) => {
                    tracing::debug!("Using VAULT_TOKEN");
                    Ok(Credentials::Token(SecretString::from(token)))
                }
                None => Ok(Credentials::Anonymous),
            },
            _ => Err(Error::AuthConfig(format!(
                "both {:?} and {:?} environment variables must be set to use Approle authentication",
                env_vars::VAULT_ROLE_ID,
                env_vars::VAULT_SECRET_ID
            ))),
        }
    }
}
