//! Wallet key
//!
//! SECURITY: the private key only leaves this type as a `SecretString`, and
//! only so the connector can persist it or hand it to a recovery backend.
//! - Keys are held in alloy's PrivateKeySigner
//! - Keys are never logged (`Debug` is redacted)

use crate::{Error, Result};
use alloy::dyn_abi::TypedData;
use alloy::primitives::{eip191_hash_message, hex, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};
use alloy::sol_types::{Eip712Domain, SolStruct};
use secrecy::{ExposeSecret, SecretString};

/// A private signing key plus its derived address
#[derive(Clone)]
pub struct WalletKey {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
}

impl WalletKey {
    /// Create a fresh random key
    pub fn generate() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    /// Load a key from its hex encoding (with or without `0x`)
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::InvalidKey(format!("{}", e)))?;

        Ok(Self::from_signer(signer))
    }

    pub fn from_secret(secret: &SecretString) -> Result<Self> {
        Self::from_hex(secret.expose_secret())
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        Self { signer, address }
    }

    /// Derived address, a pure function of the key material
    pub fn address(&self) -> Address {
        self.address
    }

    /// `0x`-prefixed hex encoding of the private key
    pub fn to_secret_hex(&self) -> SecretString {
        SecretString::from(hex::encode_prefixed(self.signer.to_bytes()))
    }

    /// Sign a 32-byte digest
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::Signing(e.to_string()))
    }

    /// EIP-191 personal message signature
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        self.sign_hash(&eip191_hash_message(message))
    }

    /// EIP-712 signature over a statically typed struct
    pub fn sign_typed<T: SolStruct>(&self, payload: &T, domain: &Eip712Domain) -> Result<Signature> {
        self.sign_hash(&payload.eip712_signing_hash(domain))
    }

    /// EIP-712 signature over a JSON typed-data document (domain, types, value)
    pub fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Signature> {
        let hash = typed_data
            .eip712_signing_hash()
            .map_err(|e| Error::Signing(format!("Invalid typed data: {}", e)))?;
        self.sign_hash(&hash)
    }
}

impl std::fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKey")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// `0x`-prefixed 65-byte `r || s || v` encoding
pub fn signature_hex(signature: &Signature) -> String {
    hex::encode_prefixed(signature.as_bytes())
}
