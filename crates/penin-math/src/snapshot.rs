//! Metric snapshot: the immutable value bundle for one candidate at one
//! evaluation point.

use crate::{check_nonnegative, check_unit, MathError, WEIGHT_TOLERANCE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The four CAOS+ subscores with their raw sub-metrics
///
/// Sub-metric keys are conventional: `pass_at_k`, `ece`,
/// `epistemic_uncertainty`, `ood_score`, `ensemble_disagreement`, `noise`,
/// `redundancy`, `entropy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaosComponents {
    pub consistency: f64,
    pub autoevolution: f64,
    pub unknowable: f64,
    pub silence: f64,
    #[serde(default)]
    pub sub_metrics: BTreeMap<String, f64>,
}

impl CaosComponents {
    pub fn new(consistency: f64, autoevolution: f64, unknowable: f64, silence: f64) -> Self {
        Self {
            consistency,
            autoevolution,
            unknowable,
            silence,
            sub_metrics: BTreeMap::new(),
        }
    }

    pub fn with_sub_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.sub_metrics.insert(name.into(), value);
        self
    }

    /// Fetch a sub-metric by conventional key
    pub fn sub_metric(&self, name: &str) -> Option<f64> {
        self.sub_metrics.get(name).copied()
    }
}

/// The four SR-Omega axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrComponents {
    pub awareness: f64,
    pub ethics_ok: bool,
    pub autocorrection: f64,
    pub metacognition: f64,
}

/// Immutable metric bundle for one candidate at one evaluation point
///
/// Produced once by the evaluation shell and never mutated; the core reads
/// it by reference. `validate` enforces the schema before any score is
/// derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub candidate_id: String,
    pub timestamp_utc: DateTime<Utc>,
    /// Normalized metric values in [0,1], keyed by metric name
    pub raw_metrics: BTreeMap<String, f64>,
    /// Nonnegative weights summing to 1, same key set as `raw_metrics`
    pub weights: BTreeMap<String, f64>,
    /// Relative compute/token/energy cost, in [0, inf)
    pub cost_normalized: f64,
    /// Per-risk-class entropy before the update
    pub risk_entropies_before: BTreeMap<String, f64>,
    /// Per-risk-class entropy after the update
    pub risk_entropies_after: BTreeMap<String, f64>,
    pub caos_components: CaosComponents,
    pub sr_components: SrComponents,
    /// Boolean result per law, keyed by law name; any false fails ethics
    pub ethics_flags: BTreeMap<String, bool>,
    pub consent: bool,
    pub eco_ok: bool,
    /// Content-addressed identifiers of the evaluated artifact
    pub config_hash: String,
    pub code_hash: String,
    pub data_hash: String,
}

impl MetricSnapshot {
    /// Enforce the snapshot schema
    pub fn validate(&self) -> Result<(), MathError> {
        if self.candidate_id.is_empty() {
            return Err(MathError::InvalidInput("candidate_id is empty".into()));
        }
        if self.raw_metrics.is_empty() {
            return Err(MathError::InvalidInput("raw_metrics is empty".into()));
        }
        if self.raw_metrics.len() != self.weights.len()
            || self.raw_metrics.keys().any(|k| !self.weights.contains_key(k))
        {
            return Err(MathError::InvalidInput(
                "weights and raw_metrics must carry the same metric names".into(),
            ));
        }

        let mut weight_sum = 0.0;
        for (name, weight) in &self.weights {
            weight_sum += check_nonnegative(name, *weight)?;
        }
        if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(MathError::WeightSum {
                sum: weight_sum,
                tolerance: WEIGHT_TOLERANCE,
            });
        }

        for (name, value) in &self.raw_metrics {
            check_unit(name, *value)?;
        }
        check_nonnegative("cost_normalized", self.cost_normalized)?;
        for (class, value) in self
            .risk_entropies_before
            .iter()
            .chain(self.risk_entropies_after.iter())
        {
            check_nonnegative(class, *value)?;
        }
        check_unit("consistency", self.caos_components.consistency)?;
        check_unit("autoevolution", self.caos_components.autoevolution)?;
        check_unit("unknowable", self.caos_components.unknowable)?;
        check_unit("silence", self.caos_components.silence)?;
        check_unit("awareness", self.sr_components.awareness)?;
        check_unit("autocorrection", self.sr_components.autocorrection)?;
        check_unit("metacognition", self.sr_components.metacognition)?;
        Ok(())
    }

    /// Weight/metric pairs in metric-name order, for the harmonic aggregator
    pub fn weighted_metrics(&self) -> Vec<(f64, f64)> {
        self.raw_metrics
            .iter()
            .map(|(name, metric)| (self.weights[name], *metric))
            .collect()
    }

    /// AND over all recorded law flags; an empty flag set is a failure
    /// (unknown ethics state resolves to fail)
    pub fn ethics_flags_all_true(&self) -> bool {
        !self.ethics_flags.is_empty() && self.ethics_flags.values().all(|ok| *ok)
    }
}
