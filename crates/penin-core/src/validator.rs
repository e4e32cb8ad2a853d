//! The two core validators: SR-Omega and Sigma-Guard
//!
//! Each validator signs its own attestation with its own key; neither sees
//! the other's verdict. The orchestrator composes their attestations into a
//! chain in the configured canonical order.

use penin_attest::{Attestation, ChainError, ServiceType, Verdict};
use penin_crypto::ValidatorKeyPair;
use penin_guard::{
    EthicsClassifier, EthicsReport, GuardError, GuardInput, GuardVerdict, SigmaGuard,
};
use penin_math::{MetricSnapshot, ScoreBundle};
use std::collections::BTreeMap;
use tracing::debug;

/// The SR-Omega reflective validator
pub struct SrValidator {
    keypair: ValidatorKeyPair,
    sr_min: f64,
}

impl SrValidator {
    pub fn new(keypair: ValidatorKeyPair, sr_min: f64) -> Self {
        Self { keypair, sr_min }
    }

    /// Sign a verdict over the reflective score
    pub fn attest(
        &self,
        snapshot: &MetricSnapshot,
        scores: &ScoreBundle,
        ethics_ok: bool,
    ) -> Result<Attestation, ChainError> {
        let verdict = if ethics_ok && scores.sr_score >= self.sr_min {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        debug!(candidate = %snapshot.candidate_id, sr = scores.sr_score, ?verdict, "sr validator verdict");

        let metrics = BTreeMap::from([
            ("sr_score".to_string(), scores.sr_score),
            ("awareness".to_string(), snapshot.sr_components.awareness),
            (
                "autocorrection".to_string(),
                snapshot.sr_components.autocorrection,
            ),
            (
                "metacognition".to_string(),
                snapshot.sr_components.metacognition,
            ),
            ("caos_plus".to_string(), scores.caos_plus),
            ("alpha_eff".to_string(), scores.alpha_eff),
        ]);
        Attestation::create(
            ServiceType::SrOmega,
            verdict,
            &snapshot.candidate_id,
            metrics,
            &self.keypair,
        )
    }
}

/// The Sigma-Guard validator: gates plus ethics, then a signed verdict
pub struct GuardValidator {
    keypair: ValidatorKeyPair,
    guard: SigmaGuard,
    ethics: EthicsClassifier,
}

impl GuardValidator {
    pub fn new(keypair: ValidatorKeyPair, guard: SigmaGuard, ethics: EthicsClassifier) -> Self {
        Self {
            keypair,
            guard,
            ethics,
        }
    }

    /// Run the fourteen-law classifier for a snapshot
    pub fn classify(&self, snapshot: &MetricSnapshot) -> EthicsReport {
        self.ethics.evaluate(snapshot)
    }

    /// Evaluate the gates and sign the outcome
    pub fn attest(
        &self,
        input: &GuardInput<'_>,
    ) -> Result<(GuardVerdict, Attestation), GuardAttestError> {
        let verdict = self.guard.evaluate(input)?;
        let wire_verdict = if verdict.passed {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        let metrics = BTreeMap::from([
            ("aggregate".to_string(), verdict.aggregate),
            ("linf".to_string(), input.scores.linf),
            (
                "gates_passed".to_string(),
                verdict.gates.iter().filter(|g| g.passed).count() as f64,
            ),
        ]);
        let attestation = Attestation::create(
            ServiceType::SigmaGuard,
            wire_verdict,
            &input.snapshot.candidate_id,
            metrics,
            &self.keypair,
        )?;
        Ok((verdict, attestation))
    }
}

/// Guard attestation can fail on input validation or on signing
#[derive(Debug, thiserror::Error)]
pub enum GuardAttestError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Chain(#[from] ChainError),
}
