//! Secret descriptor -> KV v2 request

use crate::config::SecretDescriptor;
use crate::store::SecretRequest;
use crate::{Error, Result};

impl SecretDescriptor {
    /// Path and query for reading this secret
    ///
    /// `path = {engine}/data/{name}`, `query = {version}`. Negative versions
    /// are rejected; `wallet` only names the owning wallet in that error.
    pub fn to_request(&self, wallet: &str) -> Result<SecretRequest> {
        if self.version < 0 {
            return Err(Error::InvalidDescriptor {
                wallet: wallet.to_string(),
                secret: self.identity(),
                version: self.version,
            });
        }

        Ok(SecretRequest {
            path: self.data_path(),
            query: vec![("version".to_string(), self.version.to_string())],
        })
    }

    /// `{engine}/data/{name}`, the path used for both reads and writes
    pub fn data_path(&self) -> String {
        format!("{}/data/{}", self.secret_engine, self.name)
    }
}
