//! Fourteen-law ethics classifier
//!
//! Each law is a boolean oracle; external collaborators may plug in any
//! implementation per law. Only the combiner is fixed: ethics_ok is the AND
//! over all fourteen, and an oracle that cannot produce a boolean counts as
//! false.

use penin_math::MetricSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// The fourteen laws
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Law {
    Idolatry,
    Occultism,
    PhysicalHarm,
    EmotionalHarm,
    Privacy,
    Consent,
    Transparency,
    Autonomy,
    Fairness,
    Beneficence,
    NonMaleficence,
    Accountability,
    Ecology,
    Humility,
}

impl Law {
    pub const ALL: [Law; 14] = [
        Law::Idolatry,
        Law::Occultism,
        Law::PhysicalHarm,
        Law::EmotionalHarm,
        Law::Privacy,
        Law::Consent,
        Law::Transparency,
        Law::Autonomy,
        Law::Fairness,
        Law::Beneficence,
        Law::NonMaleficence,
        Law::Accountability,
        Law::Ecology,
        Law::Humility,
    ];

    /// Stable key used in snapshot flags and reports
    pub fn key(&self) -> &'static str {
        match self {
            Law::Idolatry => "idolatry",
            Law::Occultism => "occultism",
            Law::PhysicalHarm => "physical_harm",
            Law::EmotionalHarm => "emotional_harm",
            Law::Privacy => "privacy",
            Law::Consent => "consent",
            Law::Transparency => "transparency",
            Law::Autonomy => "autonomy",
            Law::Fairness => "fairness",
            Law::Beneficence => "beneficence",
            Law::NonMaleficence => "non_maleficence",
            Law::Accountability => "accountability",
            Law::Ecology => "ecology",
            Law::Humility => "humility",
        }
    }
}

impl std::fmt::Display for Law {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One pluggable law check
pub trait LawOracle: Send + Sync {
    fn law(&self) -> Law;

    /// True when the law is upheld; an error counts as a violation
    fn check(&self, snapshot: &MetricSnapshot) -> Result<bool, String>;
}

/// Default oracle: reads the snapshot's precomputed flag for its law
pub struct SnapshotFlagOracle {
    law: Law,
}

impl SnapshotFlagOracle {
    pub fn new(law: Law) -> Self {
        Self { law }
    }
}

impl LawOracle for SnapshotFlagOracle {
    fn law(&self) -> Law {
        self.law
    }

    fn check(&self, snapshot: &MetricSnapshot) -> Result<bool, String> {
        snapshot
            .ethics_flags
            .get(self.law.key())
            .copied()
            .ok_or_else(|| format!("no flag recorded for {}", self.law.key()))
    }
}

/// Per-law flags plus the combined verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsReport {
    pub flags: BTreeMap<String, bool>,
    pub ethics_ok: bool,
}

/// Fixed AND combiner over the fourteen laws, fail-closed
pub struct EthicsClassifier {
    oracles: Vec<Box<dyn LawOracle>>,
}

impl EthicsClassifier {
    pub fn new(oracles: Vec<Box<dyn LawOracle>>) -> Self {
        Self { oracles }
    }

    /// One snapshot-flag oracle per law
    pub fn with_default_oracles() -> Self {
        Self::new(
            Law::ALL
                .iter()
                .map(|law| Box::new(SnapshotFlagOracle::new(*law)) as Box<dyn LawOracle>)
                .collect(),
        )
    }

    /// Evaluate all fourteen laws
    ///
    /// A missing oracle, an erroring oracle or a panicking oracle records
    /// false for its law. No law compensates for another.
    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> EthicsReport {
        let mut flags = BTreeMap::new();
        for law in Law::ALL {
            let upheld = match self.oracles.iter().find(|o| o.law() == law) {
                None => {
                    warn!(law = %law, "no oracle registered; recording violation");
                    false
                }
                Some(oracle) => {
                    match catch_unwind(AssertUnwindSafe(|| oracle.check(snapshot))) {
                        Ok(Ok(value)) => value,
                        Ok(Err(reason)) => {
                            warn!(law = %law, %reason, "oracle failed; recording violation");
                            false
                        }
                        Err(_) => {
                            warn!(law = %law, "oracle panicked; recording violation");
                            false
                        }
                    }
                }
            };
            flags.insert(law.key().to_string(), upheld);
        }
        let ethics_ok = flags.values().all(|ok| *ok);
        EthicsReport { flags, ethics_ok }
    }
}
