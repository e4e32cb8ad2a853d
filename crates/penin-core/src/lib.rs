//! PENIN-Omega promotion orchestrator
//!
//! The top of the decision core: a shadow -> canary -> promote state machine
//! that gathers metric snapshots, lets the SR-Omega and Sigma-Guard
//! validators sign independent attestations, composes and verifies the
//! chain, and seals every transition into the WORM ledger. The core is
//! fail-closed: unknown state, an unverifiable signature or an ambiguous
//! metric all resolve to a rollback.

use penin_attest::ChainError;
use penin_guard::GuardError;
use penin_ledger::LedgerError;
use penin_math::MathError;
use penin_pcag::PcagError;
use thiserror::Error;

pub mod audit;
mod cancel;
mod config;
mod orchestrator;
mod validator;

pub use audit::{audit_promotion, AuditReport};
pub use cancel::CancellationToken;
pub use config::{CanaryConfig, PdcConfig, RetryConfig, TimeoutConfig};
pub use orchestrator::{CandidateRecord, CandidateState, Decision, PromotionOrchestrator};
pub use validator::{GuardValidator, SrValidator};

// The shell-facing surface re-exports the value types it exchanges.
pub use penin_attest::{Attestation, AttestationChain, ServiceType, Verdict};
pub use penin_crypto::ValidatorKeyPair;
pub use penin_guard::{ChampionBaseline, EthicsClassifier, EthicsReport, GuardVerdict, Law};
pub use penin_ledger::{EventType, LedgerEvent, LedgerStats};
pub use penin_math::{KernelParams, MetricSnapshot, ScoreBundle};
pub use penin_pcag::ProofCarryingArtifact;

/// Orchestrator errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Candidate already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),
    #[error("Candidate {candidate} in state {from:?} cannot {action}")]
    InvalidTransition {
        candidate: String,
        from: orchestrator::CandidateState,
        action: &'static str,
    },
    #[error("No metric snapshot recorded for candidate {0}")]
    NoSnapshot(String),
    #[error("Canary slot for champion '{0}' is occupied")]
    SlotBusy(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("Deadline exceeded during {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Pcag(#[from] PcagError),
    /// Ledger corruption or a dead signing subsystem; aborts all in-flight
    /// transitions
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl From<validator::GuardAttestError> for OrchestratorError {
    fn from(err: validator::GuardAttestError) -> Self {
        match err {
            validator::GuardAttestError::Guard(e) => Self::Guard(e),
            validator::GuardAttestError::Chain(e) => Self::Chain(e),
        }
    }
}
