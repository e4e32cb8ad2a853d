//! Ed25519 signature service for PENIN-Omega validators
//!
//! Key pairs follow RFC 8032. The byte sequence signed is always a 32-byte
//! content hash (BLAKE2b-256 of canonical JSON); raw structures never reach
//! the signer. Private keys live only in process memory and carry no serde.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use penin_enc::Digest32;
use rand::rngs::OsRng;
use std::collections::HashMap;
use thiserror::Error;

/// Signature service errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Malformed key or signature: {0}")]
    Malformed(String),
    #[error("Signature does not match content hash")]
    Mismatch,
    #[error("No key registered for validator '{0}'")]
    KeyUnknown(String),
}

/// Ed25519 key pair owned by one validator
#[derive(Clone)]
pub struct ValidatorKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

// The secret half never reaches logs or debug output.
impl std::fmt::Debug for ValidatorKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorKeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl ValidatorKeyPair {
    /// Generate a fresh key pair from the OS RNG
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Rebuild a key pair from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Public key as 64 lowercase hex chars
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.to_bytes())
    }

    /// Public key bytes
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a 32-byte content hash, returning 128 lowercase hex chars
    pub fn sign_digest(&self, content_hash: &Digest32) -> String {
        let signature = self.signing_key.sign(content_hash);
        hex::encode(signature.to_bytes())
    }
}

/// Verify a hex signature over a content hash against a hex public key
pub fn verify_digest(
    public_key_hex: &str,
    content_hash: &Digest32,
    signature_hex: &str,
) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .map_err(|e| CryptoError::Malformed(format!("public key hex: {e}")))?
        .try_into()
        .map_err(|_| CryptoError::Malformed("public key must be 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::Malformed(format!("public key: {e}")))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| CryptoError::Malformed(format!("signature hex: {e}")))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| CryptoError::Malformed(format!("signature: {e}")))?;

    verifying_key
        .verify(content_hash, &signature)
        .map_err(|_| CryptoError::Mismatch)
}

/// Per-validator key registry supplied at startup
///
/// Rotation swaps the key pair atomically under the registry lock; old
/// attestations still verify because every attestation embeds its public key.
#[derive(Debug, Default)]
pub struct ValidatorKeyring {
    keys: HashMap<String, ValidatorKeyPair>,
}

impl ValidatorKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or rotate the key pair for a validator
    pub fn install(&mut self, validator: impl Into<String>, keypair: ValidatorKeyPair) {
        self.keys.insert(validator.into(), keypair);
    }

    /// Look up a validator's key pair
    pub fn get(&self, validator: &str) -> Result<&ValidatorKeyPair, CryptoError> {
        self.keys
            .get(validator)
            .ok_or_else(|| CryptoError::KeyUnknown(validator.to_string()))
    }

    /// Sign a content hash with a validator's current key
    pub fn sign_with(
        &self,
        validator: &str,
        content_hash: &Digest32,
    ) -> Result<(String, String), CryptoError> {
        let keypair = self.get(validator)?;
        Ok((keypair.public_key_hex(), keypair.sign_digest(content_hash)))
    }
}
