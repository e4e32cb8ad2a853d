//! The shadow -> canary -> promote state machine.

use crate::cancel::CancellationToken;
use crate::config::PdcConfig;
use crate::validator::{GuardValidator, SrValidator};
use crate::OrchestratorError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use penin_attest::{AttestationChain, ServiceType, Verdict};
use penin_crypto::ValidatorKeyPair;
use penin_guard::{ChampionBaseline, EthicsClassifier, GuardInput, GuardVerdict, SigmaGuard};
use penin_ledger::{EventType, LedgerError, LedgerEvent, LedgerStats, WormLedger};
use penin_math::{MetricSnapshot, ScoreBundle};
use penin_pcag::PcagBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Candidate lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Generated,
    Shadow,
    Canary,
    Promoted,
    Rejected,
    RolledBack,
}

/// One candidate's entry in the state table
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub candidate_id: String,
    /// The champion slot this candidate challenges
    pub champion_slot: String,
    /// Opaque checkpoint restored if this candidate is promoted then rolled
    /// back
    pub checkpoint_id: String,
    pub state: CandidateState,
    pub updated_at: DateTime<Utc>,
    pub last_reason: String,
    pub latest_snapshot: Option<MetricSnapshot>,
    pub latest_diagnostics: BTreeMap<String, f64>,
}

/// The outcome of one ledgered transition
#[derive(Debug, Clone)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
    /// Sequence of the decisive ledger event
    pub ledger_sequence: u64,
    /// Artifact hash of the sealed PCAg, present only on promotion
    pub pcag_hash: Option<String>,
}

struct PipelineOutcome {
    scores: ScoreBundle,
    guard_verdict: GuardVerdict,
    chain: AttestationChain,
    chain_ok: bool,
    decision: Verdict,
    reason: String,
}

/// The promotion orchestrator
///
/// Constructed once at process start with its configuration and validator
/// keys, then driven entirely by calls; there are no background daemons and
/// no hidden global state beyond the ledger handle and the state table.
pub struct PromotionOrchestrator {
    config: PdcConfig,
    run_id: String,
    sr: SrValidator,
    guard: GuardValidator,
    ledger: Mutex<WormLedger>,
    candidates: DashMap<String, CandidateRecord>,
    /// champion slot -> candidate currently occupying Canary
    canary_slots: Mutex<HashMap<String, String>>,
    champion: RwLock<Option<ChampionBaseline>>,
    previous_champion: RwLock<Option<ChampionBaseline>>,
}

impl PromotionOrchestrator {
    pub fn new(
        config: PdcConfig,
        sr_keypair: ValidatorKeyPair,
        guard_keypair: ValidatorKeyPair,
    ) -> Result<Self, OrchestratorError> {
        config
            .validate()
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        let sigma = SigmaGuard::new(config.guard.clone())?;
        let ledger = WormLedger::open(&config.ledger_path)?;
        let run_id = Uuid::new_v4().to_string();
        info!(%run_id, ledger = %config.ledger_path.display(), "promotion orchestrator started");

        Ok(Self {
            sr: SrValidator::new(sr_keypair, config.guard.sr_min),
            guard: GuardValidator::new(guard_keypair, sigma, EthicsClassifier::with_default_oracles()),
            config,
            run_id,
            ledger: Mutex::new(ledger),
            candidates: DashMap::new(),
            canary_slots: Mutex::new(HashMap::new()),
            champion: RwLock::new(None),
            previous_champion: RwLock::new(None),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// A token preloaded with the configured full-pipeline deadline
    pub fn pipeline_token(&self) -> CancellationToken {
        CancellationToken::with_timeout(Duration::from_millis(
            self.config.timeouts.promote_pipeline_ms,
        ))
    }

    /// Install the champion baseline the relative gates compare against
    pub fn install_champion(&self, baseline: ChampionBaseline) {
        info!(champion = %baseline.candidate_id, "champion baseline installed");
        *self.champion.write().unwrap() = Some(baseline);
    }

    pub fn champion(&self) -> Option<ChampionBaseline> {
        self.champion.read().unwrap().clone()
    }

    pub fn candidate(&self, candidate_id: &str) -> Option<CandidateRecord> {
        self.candidates.get(candidate_id).map(|r| r.clone())
    }

    /// Register a freshly generated candidate
    pub fn register(
        &self,
        candidate_id: impl Into<String>,
        champion_slot: impl Into<String>,
        checkpoint_id: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        let candidate_id = candidate_id.into();
        if self.candidates.contains_key(&candidate_id) {
            return Err(OrchestratorError::AlreadyRegistered(candidate_id));
        }
        self.candidates.insert(
            candidate_id.clone(),
            CandidateRecord {
                candidate_id,
                champion_slot: champion_slot.into(),
                checkpoint_id: checkpoint_id.into(),
                state: CandidateState::Generated,
                updated_at: Utc::now(),
                last_reason: "registered".to_string(),
                latest_snapshot: None,
                latest_diagnostics: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Accept a generated candidate into Shadow (0% live traffic)
    pub fn accept(&self, candidate_id: &str) -> Result<(), OrchestratorError> {
        let mut record = self
            .candidates
            .get_mut(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        if record.state != CandidateState::Generated {
            return Err(OrchestratorError::InvalidTransition {
                candidate: candidate_id.to_string(),
                from: record.state,
                action: "accept",
            });
        }
        record.state = CandidateState::Shadow;
        record.updated_at = Utc::now();
        record.last_reason = "accepted into shadow".to_string();
        Ok(())
    }

    /// Record the current metric snapshot and shell diagnostics for a
    /// candidate
    pub fn record_metrics(
        &self,
        candidate_id: &str,
        snapshot: MetricSnapshot,
        diagnostics: BTreeMap<String, f64>,
    ) -> Result<(), OrchestratorError> {
        snapshot.validate()?;
        let mut record = self
            .candidates
            .get_mut(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        if snapshot.candidate_id != candidate_id {
            return Err(OrchestratorError::Math(penin_math::MathError::InvalidInput(
                format!(
                    "snapshot is about '{}', not '{candidate_id}'",
                    snapshot.candidate_id
                ),
            )));
        }
        record.latest_snapshot = Some(snapshot);
        record.latest_diagnostics = diagnostics;
        Ok(())
    }

    /// Run both validators over a snapshot and compose their chain in the
    /// configured canonical order, without touching any candidate state
    pub fn evaluate_candidate(
        &self,
        snapshot: &MetricSnapshot,
        diagnostics: &BTreeMap<String, f64>,
    ) -> Result<AttestationChain, OrchestratorError> {
        Ok(self.run_pipeline(snapshot, diagnostics)?.chain)
    }

    fn run_pipeline(
        &self,
        snapshot: &MetricSnapshot,
        diagnostics: &BTreeMap<String, f64>,
    ) -> Result<PipelineOutcome, OrchestratorError> {
        let ethics = self.guard.classify(snapshot);
        let scores = self.config.kernel.score(snapshot, ethics.ethics_ok)?;
        let champion = self.champion();

        let input = GuardInput {
            snapshot,
            scores: &scores,
            ethics: &ethics,
            diagnostics,
            champion: champion.as_ref(),
        };
        let (guard_verdict, guard_att) = self.guard.attest(&input)?;
        let sr_att = self.sr.attest(snapshot, &scores, ethics.ethics_ok)?;

        let mut chain = AttestationChain::new(&snapshot.candidate_id);
        for service in &self.config.required_validators {
            match service {
                ServiceType::SrOmega => chain.add(sr_att.clone())?,
                ServiceType::SigmaGuard => chain.add(guard_att.clone())?,
                // A third signer attests through the shell and is attached
                // there; the core never forges it.
                ServiceType::Acfa => {}
            }
        }

        let (chain_ok, chain_reason) = chain.verify(&self.config.required_validators);
        let decision = if chain_ok {
            chain.final_decision(&self.config.required_validators)
        } else {
            Verdict::Fail
        };
        let reason = if !chain_ok {
            chain_reason
        } else if decision == Verdict::Pass {
            "all gates passed".to_string()
        } else if !guard_verdict.passed {
            guard_verdict.reason.clone()
        } else {
            "sr validator rejected".to_string()
        };

        Ok(PipelineOutcome {
            scores,
            guard_verdict,
            chain,
            chain_ok,
            decision,
            reason,
        })
    }

    /// Evaluate a Shadow candidate; pass moves it into Canary, fail rejects
    /// it
    pub fn evaluate_shadow(
        &self,
        candidate_id: &str,
        token: &CancellationToken,
    ) -> Result<Decision, OrchestratorError> {
        match self.evaluate_shadow_inner(candidate_id, token) {
            Err(err @ (OrchestratorError::Cancelled | OrchestratorError::Timeout(_))) => {
                self.rollback_candidate(candidate_id, interrupt_reason(&err))?;
                Err(err)
            }
            other => other,
        }
    }

    fn evaluate_shadow_inner(
        &self,
        candidate_id: &str,
        token: &CancellationToken,
    ) -> Result<Decision, OrchestratorError> {
        let (snapshot, diagnostics, slot) = self.stage_inputs(candidate_id, CandidateState::Shadow, "evaluate in shadow")?;

        token.check("guard_eval")?;
        let outcome = self.run_pipeline(&snapshot, &diagnostics)?;
        token.check("chain_verify")?;

        if outcome.decision == Verdict::Pass {
            // Reserve the canary slot before sealing the transition; only
            // one candidate may canary against a champion slot at a time.
            self.acquire_slot(&slot, candidate_id)?;
            let payload = self.eval_payload("shadow", &snapshot, &outcome)?;
            let event = match self.append_with_retry(
                EventType::ShadowEval,
                &format!("shadow-{candidate_id}"),
                payload,
                token,
            ) {
                Ok(event) => event,
                Err(err) => {
                    self.release_slot(&slot, candidate_id);
                    return Err(err);
                }
            };
            self.update_state(candidate_id, CandidateState::Canary, "shadow metrics ok");
            info!(candidate_id, sequence = event.sequence, "candidate entered canary");
            Ok(Decision {
                verdict: Verdict::Pass,
                reason: "shadow metrics ok".to_string(),
                ledger_sequence: event.sequence,
                pcag_hash: None,
            })
        } else {
            let payload = self.eval_payload("shadow", &snapshot, &outcome)?;
            let event = self.append_rollback(candidate_id, &outcome.reason, payload, token)?;
            self.update_state(candidate_id, CandidateState::Rejected, &outcome.reason);
            info!(candidate_id, reason = %outcome.reason, "candidate rejected in shadow");
            Ok(Decision {
                verdict: Verdict::Fail,
                reason: outcome.reason,
                ledger_sequence: event.sequence,
                pcag_hash: None,
            })
        }
    }

    /// Evaluate a Canary candidate end to end; pass promotes it and seals a
    /// PCAg, fail rolls it back
    pub fn promote(
        &self,
        candidate_id: &str,
        token: &CancellationToken,
    ) -> Result<Decision, OrchestratorError> {
        match self.promote_inner(candidate_id, token) {
            Err(err @ (OrchestratorError::Cancelled | OrchestratorError::Timeout(_))) => {
                self.rollback_candidate(candidate_id, interrupt_reason(&err))?;
                Err(err)
            }
            other => other,
        }
    }

    fn promote_inner(
        &self,
        candidate_id: &str,
        token: &CancellationToken,
    ) -> Result<Decision, OrchestratorError> {
        let (snapshot, diagnostics, slot) =
            self.stage_inputs(candidate_id, CandidateState::Canary, "promote")?;

        token.check("guard_eval")?;
        let outcome = self.run_pipeline(&snapshot, &diagnostics)?;
        token.check("chain_verify")?;

        if outcome.decision != Verdict::Pass {
            let payload = self.eval_payload("canary", &snapshot, &outcome)?;
            let event = self.append_rollback(candidate_id, &outcome.reason, payload, token)?;
            self.release_slot(&slot, candidate_id);
            self.update_state(candidate_id, CandidateState::RolledBack, &outcome.reason);
            info!(candidate_id, reason = %outcome.reason, "canary rolled back");
            return Ok(Decision {
                verdict: Verdict::Fail,
                reason: outcome.reason,
                ledger_sequence: event.sequence,
                pcag_hash: None,
            });
        }

        let mut canary_payload = self.eval_payload("canary", &snapshot, &outcome)?;
        if let Some(map) = canary_payload.as_object_mut() {
            map.insert(
                "canary".to_string(),
                json!({
                    "fraction": self.config.canary.fraction,
                    "min_samples": self.config.canary.min_samples,
                }),
            );
        }
        self.append_with_retry(
            EventType::CanaryEval,
            &format!("canary-{candidate_id}"),
            canary_payload,
            token,
        )?;

        let record = self
            .candidate(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        let displaced = self.champion();
        let rollback_checkpoint = displaced
            .as_ref()
            .map(|c| c.checkpoint_id.clone())
            .unwrap_or_else(|| "none".to_string());

        let promote_payload = json!({
            "candidate_id": candidate_id,
            "champion_slot": record.champion_slot,
            "displaced_champion": displaced.as_ref().map(|c| c.candidate_id.clone()),
            "checkpoint_id": record.checkpoint_id,
            "linf": outcome.scores.linf,
            "chain_hash": outcome.chain.chain_hash(),
        });
        let promote_event = self.append_with_retry(
            EventType::Promote,
            &format!("promote-{candidate_id}"),
            promote_payload,
            token,
        )?;

        let pcag = PcagBuilder::new(Uuid::new_v4().to_string(), "promotion")
            .parent_run(&self.run_id)
            .metrics(BTreeMap::from([
                ("linf".to_string(), outcome.scores.linf),
                ("sr_score".to_string(), outcome.scores.sr_score),
                ("caos_plus".to_string(), outcome.scores.caos_plus),
                ("aggregate".to_string(), outcome.guard_verdict.aggregate),
            ]))
            .gates(outcome.guard_verdict.gate_map())
            .decision(Verdict::Pass, &outcome.reason, &rollback_checkpoint)
            .artifact_hashes(
                snapshot.config_hash.clone(),
                snapshot.code_hash.clone(),
                snapshot.data_hash.clone(),
            )
            .attestation_chain(outcome.chain.chain_hash())
            .build()?;
        let pcag_hash = pcag.artifact_hash.clone();
        self.append_pcag_with_retry(pcag, token)?;

        // The in-memory tables move only after every record is durably
        // sealed.
        *self.previous_champion.write().unwrap() = displaced;
        *self.champion.write().unwrap() = Some(ChampionBaseline {
            candidate_id: candidate_id.to_string(),
            linf: outcome.scores.linf,
            cost_normalized: snapshot.cost_normalized,
            checkpoint_id: record.checkpoint_id.clone(),
        });
        self.release_slot(&slot, candidate_id);
        self.update_state(candidate_id, CandidateState::Promoted, "promoted");
        info!(candidate_id, sequence = promote_event.sequence, "candidate promoted");

        Ok(Decision {
            verdict: Verdict::Pass,
            reason: "promoted".to_string(),
            ledger_sequence: promote_event.sequence,
            pcag_hash: Some(pcag_hash),
        })
    }

    /// Cancel a candidate at any pre-terminal stage
    pub fn cancel(&self, candidate_id: &str) -> Result<Decision, OrchestratorError> {
        let record = self
            .candidate(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        match record.state {
            CandidateState::Generated | CandidateState::Shadow | CandidateState::Canary => {}
            from => {
                return Err(OrchestratorError::InvalidTransition {
                    candidate: candidate_id.to_string(),
                    from,
                    action: "cancel",
                })
            }
        }
        let event = self.rollback_candidate(candidate_id, "cancelled")?;
        Ok(Decision {
            verdict: Verdict::Fail,
            reason: "cancelled".to_string(),
            ledger_sequence: event.sequence,
            pcag_hash: None,
        })
    }

    /// Roll back a promoted candidate after a failed post-promotion check,
    /// restoring the previous champion
    pub fn post_check_rollback(
        &self,
        candidate_id: &str,
        reason: &str,
    ) -> Result<Decision, OrchestratorError> {
        let record = self
            .candidate(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        if record.state != CandidateState::Promoted {
            return Err(OrchestratorError::InvalidTransition {
                candidate: candidate_id.to_string(),
                from: record.state,
                action: "post_check_rollback",
            });
        }

        let restored = self.previous_champion.read().unwrap().clone();
        let payload = json!({
            "candidate_id": candidate_id,
            "reason": reason,
            "restored_checkpoint": restored.as_ref().map(|c| c.checkpoint_id.clone()),
            "restored_champion": restored.as_ref().map(|c| c.candidate_id.clone()),
        });
        let event = self.append_with_retry(
            EventType::Rollback,
            &format!("rollback-{candidate_id}"),
            payload,
            &CancellationToken::new(),
        )?;
        // The champion tables move only after the restoration is sealed.
        *self.previous_champion.write().unwrap() = None;
        *self.champion.write().unwrap() = restored;
        self.update_state(candidate_id, CandidateState::RolledBack, reason);
        warn!(candidate_id, reason, "promoted candidate rolled back");
        Ok(Decision {
            verdict: Verdict::Fail,
            reason: reason.to_string(),
            ledger_sequence: event.sequence,
            pcag_hash: None,
        })
    }

    /// Re-verify the full ledger hash chain
    pub fn verify_ledger(&self) -> (bool, String) {
        self.ledger.lock().unwrap().verify_chain()
    }

    pub fn merkle_root(&self) -> String {
        self.ledger.lock().unwrap().merkle_root()
    }

    pub fn ledger_stats(&self) -> LedgerStats {
        self.ledger.lock().unwrap().stats()
    }

    pub fn export_audit(&self) -> Result<String, OrchestratorError> {
        Ok(self.ledger.lock().unwrap().export_audit()?)
    }

    pub fn ledger_events(&self) -> Result<Vec<LedgerEvent>, OrchestratorError> {
        Ok(self.ledger.lock().unwrap().iter_events()?.collect())
    }

    fn stage_inputs(
        &self,
        candidate_id: &str,
        expected: CandidateState,
        action: &'static str,
    ) -> Result<(MetricSnapshot, BTreeMap<String, f64>, String), OrchestratorError> {
        let record = self
            .candidates
            .get(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        if record.state != expected {
            return Err(OrchestratorError::InvalidTransition {
                candidate: candidate_id.to_string(),
                from: record.state,
                action,
            });
        }
        let snapshot = record
            .latest_snapshot
            .clone()
            .ok_or_else(|| OrchestratorError::NoSnapshot(candidate_id.to_string()))?;
        Ok((
            snapshot,
            record.latest_diagnostics.clone(),
            record.champion_slot.clone(),
        ))
    }

    fn eval_payload(
        &self,
        stage: &str,
        snapshot: &MetricSnapshot,
        outcome: &PipelineOutcome,
    ) -> Result<serde_json::Value, OrchestratorError> {
        let chain_bytes = outcome.chain.to_canonical(&self.config.required_validators)?;
        let chain_value: serde_json::Value = serde_json::from_slice(&chain_bytes)
            .map_err(|e| OrchestratorError::Fatal(format!("chain re-encoding failed: {e}")))?;
        Ok(json!({
            "candidate_id": snapshot.candidate_id,
            "stage": stage,
            "scores": {
                "harmonic": outcome.scores.harmonic,
                "linf": outcome.scores.linf,
                "caos_plus": outcome.scores.caos_plus,
                "sr_score": outcome.scores.sr_score,
                "contractive": outcome.scores.contractive,
            },
            "guard": {
                "passed": outcome.guard_verdict.passed,
                "aggregate": outcome.guard_verdict.aggregate,
                "reason": outcome.guard_verdict.reason,
                "gates": outcome.guard_verdict.gate_map(),
            },
            "chain": chain_value,
            "chain_ok": outcome.chain_ok,
            "reason": outcome.reason,
        }))
    }

    fn append_rollback(
        &self,
        candidate_id: &str,
        reason: &str,
        mut payload: serde_json::Value,
        token: &CancellationToken,
    ) -> Result<LedgerEvent, OrchestratorError> {
        let restored = self
            .champion()
            .map(|c| c.checkpoint_id)
            .unwrap_or_else(|| "none".to_string());
        if let Some(map) = payload.as_object_mut() {
            map.insert("rollback_reason".to_string(), json!(reason));
            map.insert("restored_checkpoint".to_string(), json!(restored));
        }
        self.append_with_retry(
            EventType::Rollback,
            &format!("rollback-{candidate_id}"),
            payload,
            token,
        )
    }

    fn rollback_candidate(
        &self,
        candidate_id: &str,
        reason: &str,
    ) -> Result<LedgerEvent, OrchestratorError> {
        let slot = self
            .candidate(candidate_id)
            .map(|r| r.champion_slot)
            .unwrap_or_default();
        let payload = json!({ "candidate_id": candidate_id });
        let event =
            self.append_rollback(candidate_id, reason, payload, &CancellationToken::new())?;
        self.release_slot(&slot, candidate_id);
        self.update_state(candidate_id, CandidateState::RolledBack, reason);
        Ok(event)
    }

    fn acquire_slot(&self, slot: &str, candidate_id: &str) -> Result<(), OrchestratorError> {
        let mut slots = self.canary_slots.lock().unwrap();
        match slots.get(slot) {
            Some(holder) if holder != candidate_id => {
                Err(OrchestratorError::SlotBusy(slot.to_string()))
            }
            _ => {
                slots.insert(slot.to_string(), candidate_id.to_string());
                Ok(())
            }
        }
    }

    fn release_slot(&self, slot: &str, candidate_id: &str) {
        let mut slots = self.canary_slots.lock().unwrap();
        if slots.get(slot).map(|h| h.as_str()) == Some(candidate_id) {
            slots.remove(slot);
        }
    }

    fn update_state(&self, candidate_id: &str, state: CandidateState, reason: &str) {
        if let Some(mut record) = self.candidates.get_mut(candidate_id) {
            record.state = state;
            record.updated_at = Utc::now();
            record.last_reason = reason.to_string();
        }
    }

    fn append_with_retry(
        &self,
        event_type: EventType,
        event_id: &str,
        payload: serde_json::Value,
        token: &CancellationToken,
    ) -> Result<LedgerEvent, OrchestratorError> {
        let mut attempt = 0u32;
        loop {
            token.check("ledger_append")?;
            let result = self
                .ledger
                .lock()
                .unwrap()
                .append(event_type, event_id, payload.clone());
            match result {
                Ok(event) => return Ok(event),
                Err(LedgerError::Io(e)) => {
                    attempt += 1;
                    if attempt >= self.config.retry.max_attempts {
                        error!(event_id, attempts = attempt, "ledger append failed permanently");
                        return Err(LedgerError::Io(e).into());
                    }
                    let backoff = self.config.retry.backoff_base_ms << (attempt - 1);
                    warn!(event_id, attempt, backoff_ms = backoff, "ledger append retrying");
                    std::thread::sleep(Duration::from_millis(backoff));
                }
                Err(LedgerError::Tamper(reason)) => {
                    error!(%reason, "ledger tamper suspected; aborting all transitions");
                    return Err(OrchestratorError::Fatal(format!(
                        "ledger tamper suspected: {reason}"
                    )));
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    fn append_pcag_with_retry(
        &self,
        pcag: penin_pcag::ProofCarryingArtifact,
        token: &CancellationToken,
    ) -> Result<LedgerEvent, OrchestratorError> {
        let mut attempt = 0u32;
        loop {
            token.check("ledger_append")?;
            let result = self.ledger.lock().unwrap().append_pcag(pcag.clone());
            match result {
                Ok(event) => return Ok(event),
                Err(LedgerError::Io(e)) => {
                    attempt += 1;
                    if attempt >= self.config.retry.max_attempts {
                        return Err(LedgerError::Io(e).into());
                    }
                    let backoff = self.config.retry.backoff_base_ms << (attempt - 1);
                    std::thread::sleep(Duration::from_millis(backoff));
                }
                Err(LedgerError::Tamper(reason)) => {
                    return Err(OrchestratorError::Fatal(format!(
                        "ledger tamper suspected: {reason}"
                    )));
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}

fn interrupt_reason(err: &OrchestratorError) -> &'static str {
    match err {
        OrchestratorError::Cancelled => "cancelled",
        _ => "timeout",
    }
}
