//! Canonical encoding and hashing for the PENIN-Omega decision core
//!
//! Every structured-data hash in the core flows through this crate: canonical
//! JSON (sorted keys, compact form, UTF-8) hashed with the primary algorithm.
//! The algorithm name travels in ledger headers and attestation metadata so a
//! future migration is a one-point change here.

use blake2::digest::consts::U32;
use blake2::digest::{KeyInit, Mac};
use blake2::{Blake2b, Blake2bMac, Digest};
use hmac::Hmac;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type Blake2b256 = Blake2b<U32>;
type HmacSha256 = Hmac<Sha256>;

/// Encoding and hashing errors
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Invalid MAC key: {0}")]
    InvalidMacKey(String),
    #[error("Invalid hex digest: {0}")]
    InvalidHex(String),
}

/// 32-byte digest produced by every supported algorithm
pub type Digest32 = [u8; 32];

/// Hex form of the zero digest, used as `prev_hash` of the first ledger event
pub const ZERO_HASH_HEX: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash algorithms supported by the core
///
/// BLAKE2b-256 is the primary; SHA-256 is tolerated when a ledger header
/// declares it. New ledgers always write BLAKE2b-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[serde(rename = "blake2b-256")]
    Blake2b256,
    #[serde(rename = "sha-256")]
    Sha256,
}

impl HashAlgorithm {
    /// Wire name stored in ledger headers and attestation metadata
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blake2b256 => "blake2b-256",
            Self::Sha256 => "sha-256",
        }
    }

    /// Resolve a wire name back to an algorithm
    pub fn from_name(name: &str) -> Result<Self, EncodingError> {
        match name {
            "blake2b-256" => Ok(Self::Blake2b256),
            "sha-256" => Ok(Self::Sha256),
            other => Err(EncodingError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Blake2b256
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialize a value to canonical JSON bytes
///
/// Keys are sorted lexicographically (serde_json's map is a BTreeMap), output
/// is compact with no insignificant whitespace, numbers are in shortest
/// round-trip form. Re-parsing and re-serializing canonical bytes yields the
/// identical byte sequence.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let tree = serde_json::to_value(value)
        .map_err(|e| EncodingError::SerializationFailed(e.to_string()))?;
    serde_json::to_vec(&tree).map_err(|e| EncodingError::SerializationFailed(e.to_string()))
}

/// Parse canonical JSON bytes back into a value
pub fn from_canonical_json<T: DeserializeOwned>(data: &[u8]) -> Result<T, EncodingError> {
    serde_json::from_slice(data).map_err(|e| EncodingError::DeserializationFailed(e.to_string()))
}

/// Hash raw bytes with the given algorithm
pub fn hash_data(data: &[u8], algorithm: HashAlgorithm) -> Digest32 {
    match algorithm {
        HashAlgorithm::Blake2b256 => {
            let mut hasher = Blake2b256::new();
            hasher.update(data);
            hasher.finalize().into()
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            hasher.update(data);
            hasher.finalize().into()
        }
    }
}

/// Hash raw bytes and return 64 lowercase hex chars
pub fn hash_hex(data: &[u8], algorithm: HashAlgorithm) -> String {
    hex::encode(hash_data(data, algorithm))
}

/// Hash the canonical JSON form of a value
pub fn canonical_hash<T: Serialize>(
    value: &T,
    algorithm: HashAlgorithm,
) -> Result<Digest32, EncodingError> {
    Ok(hash_data(&canonical_json(value)?, algorithm))
}

/// Hash the canonical JSON form of a value, hex-encoded
pub fn canonical_hash_hex<T: Serialize>(
    value: &T,
    algorithm: HashAlgorithm,
) -> Result<String, EncodingError> {
    Ok(hex::encode(canonical_hash(value, algorithm)?))
}

/// Domain-separated hash over the primary algorithm
pub fn domain_hash(domain: &str, data: &[u8]) -> Digest32 {
    let mut hasher = Blake2b256::new();
    hasher.update(domain.as_bytes());
    hasher.update(b"\x00"); // Domain separator
    hasher.update(data);
    hasher.finalize().into()
}

/// Keyed MAC: BLAKE2b native keyed mode, HMAC-SHA-256 on the legacy path
pub fn keyed_mac(
    key: &[u8],
    data: &[u8],
    algorithm: HashAlgorithm,
) -> Result<Vec<u8>, EncodingError> {
    match algorithm {
        HashAlgorithm::Blake2b256 => {
            let mut mac = <Blake2bMac<U32> as KeyInit>::new_from_slice(key)
                .map_err(|e| EncodingError::InvalidMacKey(e.to_string()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha256 => {
            let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key)
                .map_err(|e| EncodingError::InvalidMacKey(e.to_string()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Verify a keyed MAC in constant time
pub fn verify_mac(
    key: &[u8],
    data: &[u8],
    tag: &[u8],
    algorithm: HashAlgorithm,
) -> Result<bool, EncodingError> {
    match algorithm {
        HashAlgorithm::Blake2b256 => {
            let mut mac = <Blake2bMac<U32> as KeyInit>::new_from_slice(key)
                .map_err(|e| EncodingError::InvalidMacKey(e.to_string()))?;
            mac.update(data);
            Ok(mac.verify_slice(tag).is_ok())
        }
        HashAlgorithm::Sha256 => {
            let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key)
                .map_err(|e| EncodingError::InvalidMacKey(e.to_string()))?;
            mac.update(data);
            Ok(mac.verify_slice(tag).is_ok())
        }
    }
}

/// Decode a 64-char lowercase hex digest
pub fn digest_from_hex(hex_str: &str) -> Result<Digest32, EncodingError> {
    let bytes =
        hex::decode(hex_str).map_err(|e| EncodingError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| EncodingError::InvalidHex(format!("expected 32 bytes, got {}", hex_str.len() / 2)))
}

/// Domain constants for PDC components
pub mod domains {
    pub const ATTESTATION: &str = "PENIN_ATTESTATION";
    pub const ATTESTATION_CHAIN: &str = "PENIN_ATTESTATION_CHAIN";
    pub const LEDGER_EVENT: &str = "PENIN_LEDGER_EVENT";
    pub const PCAG: &str = "PENIN_PCAG";

    // Merkle domains
    pub const MERKLE_LEAF: &str = "PENIN_MERKLE_LEAF";
    pub const MERKLE_INTERNAL: &str = "PENIN_MERKLE_INTERNAL";
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Serialize, Deserialize)]
    struct Unsorted {
        zulu: u32,
        alpha: String,
        mike: bool,
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let value = Unsorted {
            zulu: 7,
            alpha: "a".to_string(),
            mike: true,
        };
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":"a","mike":true,"zulu":7}"#
        );
    }

    #[test]
    fn canonical_json_is_idempotent() {
        let value = Unsorted {
            zulu: 1,
            alpha: "x".to_string(),
            mike: false,
        };
        let first = canonical_json(&value).unwrap();
        let reparsed: serde_json::Value = from_canonical_json(&first).unwrap();
        let second = canonical_json(&reparsed).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn digest_lengths() {
        let data = b"promotion decision";
        assert_eq!(hash_data(data, HashAlgorithm::Blake2b256).len(), 32);
        assert_eq!(hash_data(data, HashAlgorithm::Sha256).len(), 32);
        assert_eq!(hash_hex(data, HashAlgorithm::Blake2b256).len(), 64);
    }

    #[test]
    fn algorithms_disagree() {
        let data = b"same input";
        assert_ne!(
            hash_data(data, HashAlgorithm::Blake2b256),
            hash_data(data, HashAlgorithm::Sha256)
        );
    }

    #[test]
    fn domain_separation() {
        let data = b"identical payload";
        let a = domain_hash(domains::ATTESTATION, data);
        let b = domain_hash(domains::LEDGER_EVENT, data);
        assert_ne!(a, b);
    }

    #[test]
    fn algorithm_names_round_trip() {
        for alg in [HashAlgorithm::Blake2b256, HashAlgorithm::Sha256] {
            assert_eq!(HashAlgorithm::from_name(alg.name()).unwrap(), alg);
        }
        assert!(HashAlgorithm::from_name("md5").is_err());
    }

    #[test]
    fn keyed_mac_verifies() {
        let key = b"0123456789abcdef";
        let data = b"attested verdict";
        for alg in [HashAlgorithm::Blake2b256, HashAlgorithm::Sha256] {
            let tag = keyed_mac(key, data, alg).unwrap();
            assert!(verify_mac(key, data, &tag, alg).unwrap());
            assert!(!verify_mac(key, b"other data", &tag, alg).unwrap());
        }
    }

    #[test]
    fn zero_hash_shape() {
        assert_eq!(ZERO_HASH_HEX.len(), 64);
        assert!(ZERO_HASH_HEX.bytes().all(|b| b == b'0'));
        assert_eq!(digest_from_hex(ZERO_HASH_HEX).unwrap(), [0u8; 32]);
    }

    proptest! {
        #[test]
        fn hex_digests_are_lowercase(data in prop::collection::vec(any::<u8>(), 0..256)) {
            let hx = hash_hex(&data, HashAlgorithm::Blake2b256);
            prop_assert_eq!(hx.len(), 64);
            prop_assert!(hx.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        }

        #[test]
        fn canonical_hash_is_deterministic(
            keys in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16)
        ) {
            let h1 = canonical_hash(&keys, HashAlgorithm::Blake2b256).unwrap();
            let h2 = canonical_hash(&keys, HashAlgorithm::Blake2b256).unwrap();
            prop_assert_eq!(h1, h2);
        }
    }
}
