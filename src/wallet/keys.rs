//! Private key material
//!
//! SECURITY: keys are fetched from Vault for a single operation only.
//! - The hex string is moved out of the secret payload into zeroizing memory
//! - Raw key bytes live in a [`KeyBuffer`] that is zeroed on drop, on every
//!   exit path including parse failures
//! - The signer built from the buffer zeroes its scalar on drop
//! - Keys are never logged

use crate::config::SecretDescriptor;
use crate::store::{SecretFields, StoreClient};
use crate::{Error, Result};
use alloy::hex;
use alloy::signers::local::PrivateKeySigner;
use secrecy::SecretString;
use serde_json::Value;
use zeroize::{Zeroize, Zeroizing};

/// Length of a secp256k1 private key
pub const KEY_LENGTH: usize = 32;

/// Raw private key bytes, zeroed when dropped
pub(crate) struct KeyBuffer {
    bytes: [u8; KEY_LENGTH],
}

impl KeyBuffer {
    /// Decode a hex key (optional `0x`) into a fresh buffer
    ///
    /// The buffer exists before decoding starts, so partially decoded bytes
    /// are zeroed too when decoding fails.
    fn from_hex(encoded: &str) -> Result<Self> {
        let mut buffer = KeyBuffer {
            bytes: [0u8; KEY_LENGTH],
        };
        let digits = encoded.strip_prefix("0x").unwrap_or(encoded);
        if digits.len() != KEY_LENGTH * 2 {
            return Err(Error::KeyParse(format!(
                "expected {} hex characters, got {}",
                KEY_LENGTH * 2,
                digits.len()
            )));
        }
        hex::decode_to_slice(digits, &mut buffer.bytes)
            .map_err(|e| Error::KeyParse(e.to_string()))?;
        Ok(buffer)
    }
}

impl Drop for KeyBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
        #[cfg(test)]
        drop_log::record(&self.bytes);
    }
}

/// Key material fetched from Vault, usable exactly once
pub struct KeyMaterial {
    encoded: Zeroizing<String>,
}

impl KeyMaterial {
    /// Take the key field of `descriptor` out of a secret payload
    ///
    /// A key stored as anything but a JSON string is a format error of the
    /// secret read from `wallet`.
    pub(crate) fn from_fields(
        fields: &mut SecretFields,
        wallet: &str,
        descriptor: &SecretDescriptor,
    ) -> Result<Self> {
        match fields.take(&descriptor.key_field) {
            Some(Value::String(encoded)) => Ok(Self {
                encoded: Zeroizing::new(encoded),
            }),
            Some(mut other) => {
                crate::store::zeroize_value(&mut other);
                Err(Error::Format {
                    wallet: wallet.to_string(),
                    secret: descriptor.identity(),
                    reason: "key field value in vault is not plain string".to_string(),
                })
            }
            None => Err(Error::UnknownAccount),
        }
    }

    /// Build a signer, run `f` with it, then destroy every copy of the key
    pub fn with_signer<T>(self, f: impl FnOnce(&PrivateKeySigner) -> Result<T>) -> Result<T> {
        let buffer = KeyBuffer::from_hex(&self.encoded)?;
        let signer = PrivateKeySigner::from_slice(&buffer.bytes)
            .map_err(|e| Error::KeyParse(e.to_string()))?;
        drop(buffer);
        f(&signer)
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Read the secret behind `descriptor` and extract its private key
pub(crate) async fn fetch_key(
    client: &dyn StoreClient,
    token: Option<&SecretString>,
    wallet: &str,
    descriptor: &SecretDescriptor,
) -> Result<KeyMaterial> {
    let request = descriptor.to_request(wallet)?;
    let mut fields = client
        .read_secret(token, &request)
        .await?
        .ok_or(Error::UnknownAccount)?;
    KeyMaterial::from_fields(&mut fields, wallet, descriptor)
}
