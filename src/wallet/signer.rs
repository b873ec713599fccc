//! Hash and transaction signing
//!
//! SECURITY: signers only ever arrive here borrowed from
//! [`KeyMaterial::with_signer`](super::keys::KeyMaterial::with_signer); nothing
//! in this module can keep one alive past the call.

use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, Signed, TxLegacy};
use alloy::primitives::{ChainId, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

/// Length of a recoverable secp256k1 signature (r || s || v)
pub const SIGNATURE_LENGTH: usize = 65;

/// A transaction waiting to be signed
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub tx: TxLegacy,
    /// Private transactions are always signed without replay protection
    pub private: bool,
}

impl UnsignedTransaction {
    pub fn public(tx: TxLegacy) -> Self {
        Self { tx, private: false }
    }

    pub fn private(tx: TxLegacy) -> Self {
        Self { tx, private: true }
    }
}

/// A signed transaction, remembering whether it was private
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub signed: Signed<TxLegacy>,
    pub private: bool,
}

/// Signature encoding applied to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// EIP-155, chain id folded into the signing hash
    Eip155(ChainId),
    /// Pre-EIP-155 (homestead)
    Legacy,
}

impl SigningScheme {
    /// EIP-155 when a chain id is given for a non-private transaction,
    /// legacy otherwise.
    pub fn select(chain_id: Option<ChainId>, private: bool) -> Self {
        match chain_id {
            Some(id) if !private => SigningScheme::Eip155(id),
            _ => SigningScheme::Legacy,
        }
    }
}

/// Sign a 32-byte hash
pub(crate) fn sign_hash(signer: &PrivateKeySigner, hash: &B256) -> Result<Signature> {
    signer
        .sign_hash_sync(hash)
        .map_err(|e| Error::Signing(e.to_string()))
}

/// Sign a transaction under the scheme picked by [`SigningScheme::select`]
pub(crate) fn sign_transaction(
    signer: &PrivateKeySigner,
    unsigned: UnsignedTransaction,
    chain_id: Option<ChainId>,
) -> Result<SignedTransaction> {
    let UnsignedTransaction { mut tx, private } = unsigned;

    tx.chain_id = match SigningScheme::select(chain_id, private) {
        SigningScheme::Eip155(id) => Some(id),
        SigningScheme::Legacy => None,
    };

    let signature = sign_hash(signer, &tx.signature_hash())?;
    Ok(SignedTransaction {
        signed: tx.into_signed(signature),
        private,
    })
}
