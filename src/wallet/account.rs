//! Accounts resolved from Vault secrets

use alloy::primitives::Address;
use std::str::FromStr;
use url::Url;

/// A public identity backed by a private key held in Vault
///
/// `==` compares address and locator field by field. Use
/// [`Account::matches`] for the wallet's lookup rule, where a missing
/// locator matches any location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account {
    pub address: Address,
    /// Where the key lives: `{vault}/v1/{engine}/data/{name}?version={v}`
    pub url: Option<Url>,
}

impl Account {
    pub fn new(address: Address, url: Url) -> Self {
        Self {
            address,
            url: Some(url),
        }
    }

    /// An account known only by address; matches regardless of location
    pub fn from_address(address: Address) -> Self {
        Self { address, url: None }
    }

    /// Same address, and same location if `other` names one
    pub fn matches(&self, other: &Account) -> bool {
        self.address == other.address
            && match &other.url {
                None => true,
                Some(url) => self.url.as_ref() == Some(url),
            }
    }
}

/// Parse a hex address with or without a `0x`/`0X` prefix
pub(crate) fn parse_address(value: &str) -> Option<Address> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Address::from_str(digits).ok()
}

/// Locator URL for a secret read from `vault_url`
pub(crate) fn locator_url(vault_url: &str, path: &str, version: i64) -> Result<Url, url::ParseError> {
    let base = vault_url.trim_end_matches('/');
    Url::parse(&format!("{}/v1/{}?version={}", base, path, version))
}
