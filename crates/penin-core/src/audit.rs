//! External-auditor verification of a sealed promotion
//!
//! Given a PCAg's artifact hash and the ledger's sealed events, an auditor
//! can independently (i) locate the sealing event, (ii) recompute the
//! artifact hash, and (iii) reverify the attestation chain the artifact
//! binds. No signing keys are needed; every public key travels inside its
//! attestation.

use penin_attest::{AttestationChain, ServiceType};
use penin_ledger::{find_pcag, EventType, LedgerEvent};
use serde::{Deserialize, Serialize};

/// The outcome of one audit, with the first failure named
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub ok: bool,
    pub reason: String,
    /// Sequence of the `pcag` event, once located
    pub pcag_sequence: Option<u64>,
    /// Sequence of the evaluation event carrying the bound chain
    pub chain_sequence: Option<u64>,
}

impl AuditReport {
    fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
            pcag_sequence: None,
            chain_sequence: None,
        }
    }
}

/// Reverify one promotion from the ledger alone
pub fn audit_promotion(
    events: &[LedgerEvent],
    artifact_hash: &str,
    required: &[ServiceType],
) -> AuditReport {
    let pcag_event = match find_pcag(events, artifact_hash) {
        Some(event) => event,
        None => return AuditReport::fail("no pcag event for artifact"),
    };
    let pcag = match &pcag_event.pcag {
        Some(pcag) => pcag,
        None => return AuditReport::fail("pcag event carries no artifact"),
    };
    if pcag.verify().is_err() {
        return AuditReport::fail("artifact hash mismatch");
    }

    // The evaluation events embed the canonical chain; the artifact binds it
    // by chain hash.
    let bound_chain = events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::ShadowEval | EventType::CanaryEval))
        .find_map(|event| {
            let chain_value = event.payload.get("chain")?;
            let bytes = serde_json::to_vec(chain_value).ok()?;
            let chain = AttestationChain::from_canonical(&bytes).ok()?;
            (chain.chain_hash() == pcag.attestation_chain_hash).then_some((event.sequence, chain))
        });
    let (chain_sequence, chain) = match bound_chain {
        Some(found) => found,
        None => return AuditReport::fail("no ledgered chain matches the artifact"),
    };

    let (ok, reason) = chain.verify(required);
    if !ok {
        return AuditReport::fail(format!("attestation chain: {reason}"));
    }

    AuditReport {
        ok: true,
        reason: "ok".to_string(),
        pcag_sequence: Some(pcag_event.sequence),
        chain_sequence: Some(chain_sequence),
    }
}
