//! Signed validator attestations and verification chains
//!
//! An attestation binds one validator's verdict about one candidate to an
//! Ed25519 signature over the BLAKE2b-256 content hash of its canonical
//! form. A chain composes the attestations of independent validators; the
//! chain verifies only when every member verifies, the chain hash matches
//! recomputation and every required validator is present.

use chrono::{DateTime, Utc};
use penin_crypto::{CryptoError, ValidatorKeyPair};
use penin_enc::{canonical_hash, domain_hash, domains, EncodingError, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Attestation and chain errors
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Duplicate validator in chain: {0}")]
    Duplicate(ServiceType),
    #[error("Required validator missing from chain: {0}")]
    Incomplete(ServiceType),
    #[error("Attestation subject '{got}' does not match chain candidate '{expected}'")]
    SubjectMismatch { expected: String, got: String },
    #[error("Content hash mismatch")]
    ContentHashMismatch,
    #[error("Chain hash mismatch")]
    ChainHashMismatch,
    #[error("Signature error: {0}")]
    Signature(#[from] CryptoError),
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// The validator services that can sign a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// SR-Omega reflective validator
    SrOmega,
    /// Sigma-Guard gate evaluator
    SigmaGuard,
    /// Optional third signer, pinned per deployment
    Acfa,
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SrOmega => "sr_omega",
            Self::SigmaGuard => "sigma_guard",
            Self::Acfa => "acfa",
        };
        f.write_str(name)
    }
}

/// A validator's verdict about one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Canary,
}

/// The fields covered by the content hash, in canonical form
#[derive(Serialize)]
struct AttestationPrelude<'a> {
    service_type: ServiceType,
    verdict: Verdict,
    subject_id: &'a str,
    metrics: &'a BTreeMap<String, f64>,
    timestamp_utc: &'a DateTime<Utc>,
    hash_algorithm: HashAlgorithm,
}

/// A signed validator verdict, immutable once signed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub service_type: ServiceType,
    pub verdict: Verdict,
    /// Candidate this verdict is about
    pub subject_id: String,
    /// Metric values relevant to this validator
    pub metrics: BTreeMap<String, f64>,
    pub timestamp_utc: DateTime<Utc>,
    pub hash_algorithm: HashAlgorithm,
    /// BLAKE2b-256 over canonical JSON of all prior fields, lowercase hex
    pub content_hash: String,
    /// Ed25519 public key, 64 hex chars
    pub public_key: String,
    /// Ed25519 signature over the content hash, 128 hex chars
    pub signature: String,
}

impl Attestation {
    /// Create and sign an attestation, stamping the current time
    pub fn create(
        service_type: ServiceType,
        verdict: Verdict,
        subject_id: impl Into<String>,
        metrics: BTreeMap<String, f64>,
        keypair: &ValidatorKeyPair,
    ) -> Result<Self, ChainError> {
        Self::create_at(service_type, verdict, subject_id, metrics, keypair, Utc::now())
    }

    /// Create and sign with an explicit timestamp
    pub fn create_at(
        service_type: ServiceType,
        verdict: Verdict,
        subject_id: impl Into<String>,
        metrics: BTreeMap<String, f64>,
        keypair: &ValidatorKeyPair,
        timestamp_utc: DateTime<Utc>,
    ) -> Result<Self, ChainError> {
        let subject_id = subject_id.into();
        let hash_algorithm = HashAlgorithm::Blake2b256;
        let prelude = AttestationPrelude {
            service_type,
            verdict,
            subject_id: &subject_id,
            metrics: &metrics,
            timestamp_utc: &timestamp_utc,
            hash_algorithm,
        };
        let digest = canonical_hash(&prelude, hash_algorithm)?;
        let signature = keypair.sign_digest(&digest);
        debug!(validator = %service_type, subject = %subject_id, "attestation signed");

        Ok(Self {
            service_type,
            verdict,
            subject_id,
            metrics,
            timestamp_utc,
            hash_algorithm,
            content_hash: hex::encode(digest),
            public_key: keypair.public_key_hex(),
            signature,
        })
    }

    fn recompute_content_hash(&self) -> Result<[u8; 32], ChainError> {
        let prelude = AttestationPrelude {
            service_type: self.service_type,
            verdict: self.verdict,
            subject_id: &self.subject_id,
            metrics: &self.metrics,
            timestamp_utc: &self.timestamp_utc,
            hash_algorithm: self.hash_algorithm,
        };
        Ok(canonical_hash(&prelude, self.hash_algorithm)?)
    }

    /// Recompute the content hash and verify the signature
    ///
    /// Any mismatch is non-recoverable for this attestation.
    pub fn verify(&self) -> Result<(), ChainError> {
        let digest = self.recompute_content_hash()?;
        if hex::encode(digest) != self.content_hash {
            return Err(ChainError::ContentHashMismatch);
        }
        penin_crypto::verify_digest(&self.public_key, &digest, &self.signature)?;
        Ok(())
    }
}

/// Wire form of a chain, with the derived fields materialized
#[derive(Serialize, Deserialize)]
struct ChainRecord {
    candidate_id: String,
    attestations: Vec<Attestation>,
    chain_hash: String,
    final_decision: Verdict,
}

/// Ordered set of attestations about one candidate
///
/// Insertion order is configuration-driven (canonical order: SR-Omega first,
/// Sigma-Guard second) and determines the chain hash.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationChain {
    pub candidate_id: String,
    pub attestations: Vec<Attestation>,
}

impl AttestationChain {
    pub fn new(candidate_id: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            attestations: Vec::new(),
        }
    }

    /// Append an attestation
    ///
    /// Rejects a subject mismatch and a duplicate service type.
    pub fn add(&mut self, attestation: Attestation) -> Result<(), ChainError> {
        if attestation.subject_id != self.candidate_id {
            return Err(ChainError::SubjectMismatch {
                expected: self.candidate_id.clone(),
                got: attestation.subject_id,
            });
        }
        if self
            .attestations
            .iter()
            .any(|a| a.service_type == attestation.service_type)
        {
            return Err(ChainError::Duplicate(attestation.service_type));
        }
        self.attestations.push(attestation);
        Ok(())
    }

    /// BLAKE2b-256 over the concatenated member content hashes in insertion
    /// order, lowercase hex
    pub fn chain_hash(&self) -> String {
        let mut concat = Vec::with_capacity(self.attestations.len() * 32);
        for attestation in &self.attestations {
            concat.extend_from_slice(attestation.content_hash.as_bytes());
        }
        hex::encode(domain_hash(domains::ATTESTATION_CHAIN, &concat))
    }

    /// Derived decision: pass iff every required validator is present and
    /// every verdict is pass; any fail or absence is fail; otherwise canary
    pub fn final_decision(&self, required: &[ServiceType]) -> Verdict {
        for service in required {
            if !self.attestations.iter().any(|a| a.service_type == *service) {
                return Verdict::Fail;
            }
        }
        if self.attestations.iter().any(|a| a.verdict == Verdict::Fail) {
            return Verdict::Fail;
        }
        if self.attestations.iter().all(|a| a.verdict == Verdict::Pass) {
            Verdict::Pass
        } else {
            Verdict::Canary
        }
    }

    /// Verify the whole chain: every member individually, then completeness
    ///
    /// Returns `(true, "ok")` or `(false, reason)` with a stable short
    /// reason naming the first failure.
    pub fn verify(&self, required: &[ServiceType]) -> (bool, String) {
        for attestation in &self.attestations {
            if let Err(err) = attestation.verify() {
                let reason = match err {
                    ChainError::ContentHashMismatch => {
                        format!("content_hash mismatch for {}", attestation.service_type)
                    }
                    ChainError::Signature(_) => {
                        format!("signature invalid for {}", attestation.service_type)
                    }
                    other => other.to_string(),
                };
                return (false, reason);
            }
        }
        for service in required {
            if !self.attestations.iter().any(|a| a.service_type == *service) {
                return (false, format!("missing required validator {service}"));
            }
        }
        (true, "ok".to_string())
    }

    /// Canonical persistence form, including the derived fields
    pub fn to_canonical(&self, required: &[ServiceType]) -> Result<Vec<u8>, ChainError> {
        let record = ChainRecord {
            candidate_id: self.candidate_id.clone(),
            attestations: self.attestations.clone(),
            chain_hash: self.chain_hash(),
            final_decision: self.final_decision(required),
        };
        Ok(penin_enc::canonical_json(&record)?)
    }

    /// Rebuild a chain from its canonical form, checking the stored chain
    /// hash against recomputation
    pub fn from_canonical(data: &[u8]) -> Result<Self, ChainError> {
        let record: ChainRecord = penin_enc::from_canonical_json(data)?;
        let chain = Self {
            candidate_id: record.candidate_id,
            attestations: record.attestations,
        };
        if chain.chain_hash() != record.chain_hash {
            return Err(ChainError::ChainHashMismatch);
        }
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.attestations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty()
    }
}

/// Default required validator set: SR-Omega and Sigma-Guard
pub const DEFAULT_REQUIRED: [ServiceType; 2] = [ServiceType::SrOmega, ServiceType::SigmaGuard];
