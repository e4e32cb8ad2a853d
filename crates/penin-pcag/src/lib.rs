//! Proof-Carrying Artifact assembly
//!
//! A PCAg is the unit an external auditor needs: given the artifact plus the
//! referenced hashes, the auditor can reverify the attestation chain,
//! recompute the artifact hash and locate the sealing ledger event. A PCAg
//! is only ever built for an accepted decision; rejected decisions are
//! ledgered as rollbacks without one.

use chrono::{DateTime, Utc};
use penin_attest::Verdict;
use penin_enc::{canonical_hash, EncodingError, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcagError {
    #[error("Refusing to build a PCAg for a {0:?} decision")]
    RejectedDecision(Verdict),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Artifact hash mismatch")]
    HashMismatch,
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// The decision a PCAg proves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcagDecision {
    pub verdict: Verdict,
    pub reason: String,
    /// Checkpoint restored if this promotion is later rolled back
    pub rollback_checkpoint: String,
}

/// Self-describing proof of one promotion decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofCarryingArtifact {
    pub artifact_id: String,
    pub artifact_type: String,
    pub parent_run_id: String,
    pub timestamp_utc: DateTime<Utc>,
    /// Scores the decision was taken on
    pub metrics: BTreeMap<String, f64>,
    /// Per-gate pass/fail at decision time
    pub gates: BTreeMap<String, bool>,
    pub decision: PcagDecision,
    pub config_hash: String,
    pub code_hash: String,
    pub data_hash: String,
    pub attestation_chain_hash: String,
    pub hash_algorithm: HashAlgorithm,
    /// BLAKE2b-256 binding every field above, lowercase hex
    pub artifact_hash: String,
}

/// The fields covered by the artifact hash, in canonical form
#[derive(Serialize)]
struct ArtifactPrelude<'a> {
    artifact_id: &'a str,
    artifact_type: &'a str,
    parent_run_id: &'a str,
    timestamp_utc: &'a DateTime<Utc>,
    metrics: &'a BTreeMap<String, f64>,
    gates: &'a BTreeMap<String, bool>,
    decision: &'a PcagDecision,
    config_hash: &'a str,
    code_hash: &'a str,
    data_hash: &'a str,
    attestation_chain_hash: &'a str,
    hash_algorithm: HashAlgorithm,
}

impl ProofCarryingArtifact {
    fn compute_hash(&self) -> Result<String, PcagError> {
        let prelude = ArtifactPrelude {
            artifact_id: &self.artifact_id,
            artifact_type: &self.artifact_type,
            parent_run_id: &self.parent_run_id,
            timestamp_utc: &self.timestamp_utc,
            metrics: &self.metrics,
            gates: &self.gates,
            decision: &self.decision,
            config_hash: &self.config_hash,
            code_hash: &self.code_hash,
            data_hash: &self.data_hash,
            attestation_chain_hash: &self.attestation_chain_hash,
            hash_algorithm: self.hash_algorithm,
        };
        Ok(hex::encode(canonical_hash(&prelude, self.hash_algorithm)?))
    }

    /// Recompute the artifact hash and compare with the stored one
    pub fn verify(&self) -> Result<(), PcagError> {
        if self.compute_hash()? != self.artifact_hash {
            return Err(PcagError::HashMismatch);
        }
        Ok(())
    }
}

/// Assembles a PCAg after the chain verified and a decision was produced
#[derive(Debug, Default)]
pub struct PcagBuilder {
    artifact_id: Option<String>,
    artifact_type: Option<String>,
    parent_run_id: Option<String>,
    metrics: BTreeMap<String, f64>,
    gates: BTreeMap<String, bool>,
    decision: Option<PcagDecision>,
    config_hash: Option<String>,
    code_hash: Option<String>,
    data_hash: Option<String>,
    attestation_chain_hash: Option<String>,
}

impl PcagBuilder {
    pub fn new(artifact_id: impl Into<String>, artifact_type: impl Into<String>) -> Self {
        Self {
            artifact_id: Some(artifact_id.into()),
            artifact_type: Some(artifact_type.into()),
            ..Self::default()
        }
    }

    pub fn parent_run(mut self, run_id: impl Into<String>) -> Self {
        self.parent_run_id = Some(run_id.into());
        self
    }

    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn metrics(mut self, metrics: BTreeMap<String, f64>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn gates(mut self, gates: BTreeMap<String, bool>) -> Self {
        self.gates = gates;
        self
    }

    pub fn decision(
        mut self,
        verdict: Verdict,
        reason: impl Into<String>,
        rollback_checkpoint: impl Into<String>,
    ) -> Self {
        self.decision = Some(PcagDecision {
            verdict,
            reason: reason.into(),
            rollback_checkpoint: rollback_checkpoint.into(),
        });
        self
    }

    pub fn artifact_hashes(
        mut self,
        config_hash: impl Into<String>,
        code_hash: impl Into<String>,
        data_hash: impl Into<String>,
    ) -> Self {
        self.config_hash = Some(config_hash.into());
        self.code_hash = Some(code_hash.into());
        self.data_hash = Some(data_hash.into());
        self
    }

    pub fn attestation_chain(mut self, chain_hash: impl Into<String>) -> Self {
        self.attestation_chain_hash = Some(chain_hash.into());
        self
    }

    /// Seal the artifact, refusing any decision the guard rejected
    pub fn build(self) -> Result<ProofCarryingArtifact, PcagError> {
        self.build_at(Utc::now())
    }

    /// Seal with an explicit timestamp
    pub fn build_at(self, timestamp_utc: DateTime<Utc>) -> Result<ProofCarryingArtifact, PcagError> {
        let decision = self.decision.ok_or(PcagError::MissingField("decision"))?;
        if decision.verdict != Verdict::Pass {
            return Err(PcagError::RejectedDecision(decision.verdict));
        }

        let mut artifact = ProofCarryingArtifact {
            artifact_id: self.artifact_id.ok_or(PcagError::MissingField("artifact_id"))?,
            artifact_type: self
                .artifact_type
                .ok_or(PcagError::MissingField("artifact_type"))?,
            parent_run_id: self
                .parent_run_id
                .ok_or(PcagError::MissingField("parent_run_id"))?,
            timestamp_utc,
            metrics: self.metrics,
            gates: self.gates,
            decision,
            config_hash: self.config_hash.ok_or(PcagError::MissingField("config_hash"))?,
            code_hash: self.code_hash.ok_or(PcagError::MissingField("code_hash"))?,
            data_hash: self.data_hash.ok_or(PcagError::MissingField("data_hash"))?,
            attestation_chain_hash: self
                .attestation_chain_hash
                .ok_or(PcagError::MissingField("attestation_chain_hash"))?,
            hash_algorithm: HashAlgorithm::Blake2b256,
            artifact_hash: String::new(),
        };
        artifact.artifact_hash = artifact.compute_hash()?;
        Ok(artifact)
    }
}
