//! Kernel functions: harmonic aggregation, L-infinity, CAOS+, SR-Omega,
//! effective step and risk contractivity.

use crate::snapshot::{CaosComponents, MetricSnapshot};
use crate::{check_finite, check_nonnegative, check_unit, MathError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Floor applied to every metric inside a harmonic sum
pub const DEFAULT_EPS: f64 = 1e-3;
/// Tolerance on the weight sum
pub const WEIGHT_TOLERANCE: f64 = 1e-6;
/// Ethics axis value when ethics_ok is false: collapses SR toward zero
/// without producing NaN
pub const EPS_ETHICS: f64 = 1e-3;
/// Default cost penalty exponent
pub const DEFAULT_LAMBDA_C: f64 = 0.5;
/// Default CAOS+ amplification
pub const DEFAULT_KAPPA: f64 = 20.0;
/// Default step saturation
pub const DEFAULT_GAMMA: f64 = 0.8;
/// CAOS+ clamp bounds
pub const DEFAULT_CAOS_MIN: f64 = 1.0;
pub const DEFAULT_CAOS_MAX: f64 = 10.0;

/// Weighted harmonic aggregation: `1 / sum(w_i / max(eps, m_i))`
///
/// The harmonic mean is non-compensatory: the aggregate never exceeds the
/// worst metric by more than the epsilon floor allows, so one bad metric
/// cannot be bought back by good ones.
pub fn harmonic_mean(pairs: &[(f64, f64)], eps: f64) -> Result<f64, MathError> {
    if pairs.is_empty() {
        return Err(MathError::InvalidInput("no metrics to aggregate".into()));
    }
    let eps = check_nonnegative("eps", eps)?;
    if eps == 0.0 {
        return Err(MathError::InvalidInput("eps must be positive".into()));
    }

    let mut weight_sum = 0.0;
    let mut denom = 0.0;
    for (weight, metric) in pairs {
        let weight = check_nonnegative("weight", *weight)?;
        let metric = check_nonnegative("metric", *metric)?;
        weight_sum += weight;
        denom += weight / metric.max(eps);
    }
    if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(MathError::WeightSum {
            sum: weight_sum,
            tolerance: WEIGHT_TOLERANCE,
        });
    }
    Ok(1.0 / denom)
}

/// L-infinity meta-score: `H * exp(-lambda_c * cost) * [ethics & contractivity]`
///
/// Fail-closed: either boolean gate false makes the result exactly 0.0.
pub fn linf_score(
    pairs: &[(f64, f64)],
    cost_normalized: f64,
    lambda_c: f64,
    ethics_ok: bool,
    contractivity_ok: bool,
    eps: f64,
) -> Result<f64, MathError> {
    let cost = check_nonnegative("cost_normalized", cost_normalized)?;
    let lambda_c = check_finite("lambda_c", lambda_c)?;
    if !(0.0..=5.0).contains(&lambda_c) {
        return Err(MathError::InvalidInput(format!(
            "lambda_c must be in [0,5], got {lambda_c}"
        )));
    }
    let harmonic = harmonic_mean(pairs, eps)?;

    if !ethics_ok || !contractivity_ok {
        return Ok(0.0);
    }
    Ok(harmonic * (-lambda_c * cost).exp())
}

/// CAOS+ configuration: amplification and output clamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaosConfig {
    /// Amplification factor, >= 1
    pub kappa: f64,
    pub caos_min: f64,
    pub caos_max: f64,
    /// EMA half-life in evaluation steps; <= 0 disables smoothing
    pub ema_half_life: f64,
}

impl Default for CaosConfig {
    fn default() -> Self {
        Self {
            kappa: DEFAULT_KAPPA,
            caos_min: DEFAULT_CAOS_MIN,
            caos_max: DEFAULT_CAOS_MAX,
            ema_half_life: 0.0,
        }
    }
}

impl CaosConfig {
    fn validate(&self) -> Result<(), MathError> {
        if check_finite("kappa", self.kappa)? < 1.0 {
            return Err(MathError::InvalidInput(format!(
                "kappa must be >= 1, got {}",
                self.kappa
            )));
        }
        if self.caos_min > self.caos_max {
            return Err(MathError::InvalidInput(format!(
                "caos clamp inverted: [{}, {}]",
                self.caos_min, self.caos_max
            )));
        }
        Ok(())
    }
}

/// Smoothed CAOS+ component state, passed in and returned explicitly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaosState {
    pub consistency: f64,
    pub autoevolution: f64,
    pub unknowable: f64,
    pub silence: f64,
}

/// CAOS+ modulator: `(1 + kappa*C*A)^(O*S)`, clamped
pub fn caos_plus(components: &CaosComponents, config: &CaosConfig) -> Result<f64, MathError> {
    config.validate()?;
    let c = check_unit("consistency", components.consistency)?;
    let a = check_unit("autoevolution", components.autoevolution)?;
    let o = check_unit("unknowable", components.unknowable)?;
    let s = check_unit("silence", components.silence)?;

    let raw = (1.0 + config.kappa * c * a).powf(o * s);
    Ok(raw.clamp(config.caos_min, config.caos_max))
}

/// CAOS+ with exponential smoothing of each component
///
/// The state is explicit: callers hold it between evaluations and hand it
/// back in; `None` seeds the EMA with the raw components.
pub fn caos_plus_smoothed(
    components: &CaosComponents,
    state: Option<CaosState>,
    config: &CaosConfig,
) -> Result<(f64, CaosState), MathError> {
    config.validate()?;
    let c = check_unit("consistency", components.consistency)?;
    let a = check_unit("autoevolution", components.autoevolution)?;
    let o = check_unit("unknowable", components.unknowable)?;
    let s = check_unit("silence", components.silence)?;

    let next = match state {
        Some(prev) if config.ema_half_life > 0.0 => {
            let alpha = 1.0 - (-std::f64::consts::LN_2 / config.ema_half_life).exp();
            CaosState {
                consistency: alpha * c + (1.0 - alpha) * prev.consistency,
                autoevolution: alpha * a + (1.0 - alpha) * prev.autoevolution,
                unknowable: alpha * o + (1.0 - alpha) * prev.unknowable,
                silence: alpha * s + (1.0 - alpha) * prev.silence,
            }
        }
        _ => CaosState {
            consistency: c,
            autoevolution: a,
            unknowable: o,
            silence: s,
        },
    };

    let smoothed = CaosComponents {
        consistency: next.consistency,
        autoevolution: next.autoevolution,
        unknowable: next.unknowable,
        silence: next.silence,
        sub_metrics: BTreeMap::new(),
    };
    Ok((caos_plus(&smoothed, config)?, next))
}

/// SR-Omega reflective score: harmonic mean of awareness, the ethics axis,
/// autocorrection and metacognition
///
/// The ethics axis is 1.0 when ethics_ok holds, else a tiny positive epsilon
/// so the score collapses toward zero without producing NaN.
pub fn sr_omega(
    awareness: f64,
    ethics_ok: bool,
    autocorrection: f64,
    metacognition: f64,
) -> Result<f64, MathError> {
    let awareness = check_unit("awareness", awareness)?;
    let autocorrection = check_unit("autocorrection", autocorrection)?;
    let metacognition = check_unit("metacognition", metacognition)?;
    let ethics_axis = if ethics_ok { 1.0 } else { EPS_ETHICS };

    harmonic_mean(
        &[
            (0.25, awareness),
            (0.25, ethics_axis),
            (0.25, autocorrection),
            (0.25, metacognition),
        ],
        DEFAULT_EPS,
    )
}

/// Effective step size: `alpha0 * tanh(gamma * ln(CAOS+)) * R`
pub fn alpha_eff(alpha0: f64, caos: f64, r: f64, gamma: f64) -> Result<f64, MathError> {
    let alpha0 = check_nonnegative("alpha0", alpha0)?;
    let caos = check_finite("caos", caos)?;
    if caos < 1.0 {
        return Err(MathError::InvalidInput(format!(
            "CAOS+ must be >= 1, got {caos}"
        )));
    }
    let r = check_unit("r", r)?;
    let gamma = check_finite("gamma", gamma)?;
    if !(gamma > 0.0 && gamma <= 2.0) {
        return Err(MathError::InvalidInput(format!(
            "gamma must be in (0,2], got {gamma}"
        )));
    }
    Ok(alpha0 * (gamma * caos.ln()).tanh() * r)
}

/// Per-class result of the IR->IC contractivity check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractivityReport {
    pub contractive: bool,
    /// H_after / H_before per risk class; infinite when risk appeared from zero
    pub ratios: BTreeMap<String, f64>,
    pub rho: f64,
}

/// Risk contractivity: for every class, `H_after <= rho * H_before`
///
/// Monotonic: the aggregate is contractive iff every per-class ratio is
/// within rho.
pub fn verify_contractive(
    before: &BTreeMap<String, f64>,
    after: &BTreeMap<String, f64>,
    rho: f64,
) -> Result<ContractivityReport, MathError> {
    let rho = check_finite("rho", rho)?;
    if !(rho > 0.0 && rho < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "rho must be in (0,1), got {rho}"
        )));
    }
    if before.is_empty() {
        return Err(MathError::InvalidInput("no risk classes".into()));
    }
    if before.len() != after.len() || before.keys().any(|k| !after.contains_key(k)) {
        return Err(MathError::InvalidInput(
            "risk class sets differ between before and after".into(),
        ));
    }

    let mut ratios = BTreeMap::new();
    let mut contractive = true;
    for (class, h_before) in before {
        let h_before = check_nonnegative(class, *h_before)?;
        let h_after = check_nonnegative(class, after[class])?;

        let ratio = if h_before == 0.0 {
            if h_after == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            h_after / h_before
        };
        if !(h_after <= rho * h_before) {
            contractive = false;
        }
        ratios.insert(class.clone(), ratio);
    }

    Ok(ContractivityReport {
        contractive,
        ratios,
        rho,
    })
}

/// Kernel parameters, immutable within one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    pub eps: f64,
    pub lambda_c: f64,
    pub gamma: f64,
    pub rho: f64,
    pub alpha0: f64,
    pub caos: CaosConfig,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            lambda_c: DEFAULT_LAMBDA_C,
            gamma: DEFAULT_GAMMA,
            rho: 0.95,
            alpha0: 0.1,
            caos: CaosConfig::default(),
        }
    }
}

/// Scores derived from one snapshot with one parameter set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBundle {
    pub harmonic: f64,
    pub linf: f64,
    pub caos_plus: f64,
    pub sr_score: f64,
    pub alpha_eff: f64,
    pub contractive: bool,
    pub risk_ratios: BTreeMap<String, f64>,
}

impl KernelParams {
    /// Compute every kernel score for one snapshot
    ///
    /// `ethics_ok` is the ethics classifier's combined verdict; the kernel
    /// takes it as a fact rather than re-deriving it.
    pub fn score(
        &self,
        snapshot: &MetricSnapshot,
        ethics_ok: bool,
    ) -> Result<ScoreBundle, MathError> {
        snapshot.validate()?;

        let pairs = snapshot.weighted_metrics();
        let harmonic = harmonic_mean(&pairs, self.eps)?;
        let contractivity = verify_contractive(
            &snapshot.risk_entropies_before,
            &snapshot.risk_entropies_after,
            self.rho,
        )?;
        let linf = linf_score(
            &pairs,
            snapshot.cost_normalized,
            self.lambda_c,
            ethics_ok,
            contractivity.contractive,
            self.eps,
        )?;
        let caos = caos_plus(&snapshot.caos_components, &self.caos)?;
        let sr = sr_omega(
            snapshot.sr_components.awareness,
            ethics_ok && snapshot.sr_components.ethics_ok,
            snapshot.sr_components.autocorrection,
            snapshot.sr_components.metacognition,
        )?;
        let alpha = alpha_eff(self.alpha0, caos, sr, self.gamma)?;

        Ok(ScoreBundle {
            harmonic,
            linf,
            caos_plus: caos,
            sr_score: sr,
            alpha_eff: alpha,
            contractive: contractivity.contractive,
            risk_ratios: contractivity.ratios,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pairs3() -> Vec<(f64, f64)> {
        vec![(0.4, 0.85), (0.4, 0.78), (0.2, 0.92)]
    }

    #[test]
    fn harmonic_is_bounded_by_min_metric() {
        let h = harmonic_mean(&pairs3(), DEFAULT_EPS).unwrap();
        assert!(h <= 0.78 + 1e-12);
        assert!(h > 0.0);
    }

    #[test]
    fn harmonic_rejects_bad_weights() {
        assert!(matches!(
            harmonic_mean(&[(0.5, 0.5), (0.4, 0.5)], DEFAULT_EPS),
            Err(MathError::WeightSum { .. })
        ));
    }

    #[test]
    fn harmonic_rejects_nan() {
        assert!(harmonic_mean(&[(1.0, f64::NAN)], DEFAULT_EPS).is_err());
        assert!(harmonic_mean(&[(f64::INFINITY, 0.5)], DEFAULT_EPS).is_err());
    }

    #[test]
    fn harmonic_floors_zero_metric() {
        // A zero metric is floored at eps, never divided by zero.
        let h = harmonic_mean(&[(0.5, 0.0), (0.5, 1.0)], DEFAULT_EPS).unwrap();
        assert!(h.is_finite());
        assert!(h < 0.01);
    }

    #[test]
    fn linf_reference_value() {
        // Weights {0.4, 0.4, 0.2}, metrics {0.85, 0.78, 0.92}, cost 0.15,
        // lambda_c 0.5: H = 0.832778, penalty = exp(-0.075).
        let linf = linf_score(&pairs3(), 0.15, 0.5, true, true, DEFAULT_EPS).unwrap();
        assert!((linf - 0.772604).abs() < 1e-4, "got {linf}");
    }

    #[test]
    fn linf_fails_closed_on_ethics() {
        let linf = linf_score(&pairs3(), 0.15, 0.5, false, true, DEFAULT_EPS).unwrap();
        assert_eq!(linf, 0.0);
    }

    #[test]
    fn linf_fails_closed_on_contractivity() {
        let linf = linf_score(&pairs3(), 0.15, 0.5, true, false, DEFAULT_EPS).unwrap();
        assert_eq!(linf, 0.0);
    }

    #[test]
    fn linf_negligible_when_any_metric_is_zero() {
        // With the floor tightened, the zero term dominates the harmonic sum
        // and the meta-score is negligible.
        let pairs = vec![(0.4, 0.0), (0.4, 0.78), (0.2, 0.92)];
        let linf = linf_score(&pairs, 0.15, 0.5, true, true, 1e-10).unwrap();
        assert!(linf <= 1e-9, "got {linf}");
    }

    #[test]
    fn caos_identity_at_zero_consistency() {
        let components = CaosComponents::new(0.0, 0.7, 0.5, 0.5);
        let v = caos_plus(&components, &CaosConfig::default()).unwrap();
        assert_eq!(v, 1.0);
    }

    #[test]
    fn caos_rejects_out_of_range() {
        let components = CaosComponents::new(1.2, 0.7, 0.5, 0.5);
        assert!(caos_plus(&components, &CaosConfig::default()).is_err());
    }

    #[test]
    fn caos_clamps_to_max() {
        let components = CaosComponents::new(1.0, 1.0, 1.0, 1.0);
        let v = caos_plus(&components, &CaosConfig::default()).unwrap();
        assert_eq!(v, DEFAULT_CAOS_MAX);
    }

    #[test]
    fn caos_ema_converges_toward_raw() {
        let config = CaosConfig {
            ema_half_life: 2.0,
            ..CaosConfig::default()
        };
        let raw = CaosComponents::new(0.8, 0.8, 0.5, 0.5);
        let seed = CaosState {
            consistency: 0.2,
            autoevolution: 0.2,
            unknowable: 0.2,
            silence: 0.2,
        };
        let (_, s1) = caos_plus_smoothed(&raw, Some(seed), &config).unwrap();
        let (_, s2) = caos_plus_smoothed(&raw, Some(s1), &config).unwrap();
        assert!(s1.consistency > seed.consistency);
        assert!(s2.consistency > s1.consistency);
        assert!(s2.consistency < 0.8);
    }

    #[test]
    fn sr_collapses_without_ethics() {
        let with = sr_omega(0.9, true, 0.9, 0.9).unwrap();
        let without = sr_omega(0.9, false, 0.9, 0.9).unwrap();
        assert!(with > 0.8);
        assert!(without < 0.01);
        assert!(without > 0.0);
    }

    #[test]
    fn alpha_eff_reference() {
        // CAOS+ = 1 means no step: tanh(gamma * ln 1) = 0.
        assert_eq!(alpha_eff(0.1, 1.0, 0.9, DEFAULT_GAMMA).unwrap(), 0.0);
        let a = alpha_eff(0.1, 10.0, 0.9, DEFAULT_GAMMA).unwrap();
        assert!(a > 0.0 && a < 0.1);
    }

    #[test]
    fn contractivity_report() {
        let before = BTreeMap::from([
            ("harm".to_string(), 1.0),
            ("privacy".to_string(), 0.5),
        ]);
        let after = BTreeMap::from([
            ("harm".to_string(), 0.8),
            ("privacy".to_string(), 0.4),
        ]);
        let report = verify_contractive(&before, &after, 0.85).unwrap();
        assert!(report.contractive);
        assert!((report.ratios["harm"] - 0.8).abs() < 1e-12);

        let report = verify_contractive(&before, &after, 0.75).unwrap();
        assert!(!report.contractive);
    }

    #[test]
    fn contractivity_risk_from_zero_is_infinite() {
        let before = BTreeMap::from([("bias".to_string(), 0.0)]);
        let after = BTreeMap::from([("bias".to_string(), 0.1)]);
        let report = verify_contractive(&before, &after, 0.9).unwrap();
        assert!(!report.contractive);
        assert!(report.ratios["bias"].is_infinite());
    }

    #[test]
    fn contractivity_rejects_mismatched_classes() {
        let before = BTreeMap::from([("harm".to_string(), 1.0)]);
        let after = BTreeMap::from([("privacy".to_string(), 0.5)]);
        assert!(verify_contractive(&before, &after, 0.9).is_err());
    }

    proptest! {
        #[test]
        fn harmonic_never_exceeds_min_metric(
            metrics in prop::collection::vec(0.001f64..1.0, 2..6)
        ) {
            let w = 1.0 / metrics.len() as f64;
            let pairs: Vec<(f64, f64)> = metrics.iter().map(|m| (w, *m)).collect();
            let h = harmonic_mean(&pairs, DEFAULT_EPS).unwrap();
            let min = metrics.iter().cloned().fold(f64::INFINITY, f64::min);
            prop_assert!(h <= min + 1e-9);
        }

        #[test]
        fn linf_monotone_in_each_metric(
            base in 0.1f64..0.9,
            bump in 0.0f64..0.1,
            cost in 0.0f64..2.0
        ) {
            let low = vec![(0.5, base), (0.5, 0.5)];
            let high = vec![(0.5, base + bump), (0.5, 0.5)];
            let a = linf_score(&low, cost, 0.5, true, true, DEFAULT_EPS).unwrap();
            let b = linf_score(&high, cost, 0.5, true, true, DEFAULT_EPS).unwrap();
            prop_assert!(b + 1e-12 >= a);
        }

        #[test]
        fn caos_monotone_in_each_subscore(
            c in 0.0f64..1.0, a in 0.0f64..1.0, o in 0.0f64..1.0, s in 0.0f64..1.0,
            bump in 0.0f64..0.2
        ) {
            let config = CaosConfig::default();
            let base = caos_plus(&CaosComponents::new(c, a, o, s), &config).unwrap();
            for raised in [
                CaosComponents::new((c + bump).min(1.0), a, o, s),
                CaosComponents::new(c, (a + bump).min(1.0), o, s),
                CaosComponents::new(c, a, (o + bump).min(1.0), s),
                CaosComponents::new(c, a, o, (s + bump).min(1.0)),
            ] {
                let v = caos_plus(&raised, &config).unwrap();
                prop_assert!(v + 1e-9 >= base);
            }
        }

        #[test]
        fn sr_stays_in_unit_interval(
            aw in 0.0f64..1.0, ac in 0.0f64..1.0, mc in 0.0f64..1.0, ok in any::<bool>()
        ) {
            let r = sr_omega(aw, ok, ac, mc).unwrap();
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn contractive_implies_every_class_within_rho(
            entries in prop::collection::btree_map(
                "[a-z]{1,6}",
                (0.01f64..2.0, 0.0f64..2.0),
                1..5
            ),
            rho in 0.05f64..0.95
        ) {
            let before: BTreeMap<String, f64> =
                entries.iter().map(|(k, (b, _))| (k.clone(), *b)).collect();
            let after: BTreeMap<String, f64> =
                entries.iter().map(|(k, (_, a))| (k.clone(), *a)).collect();
            let report = verify_contractive(&before, &after, rho).unwrap();
            if report.contractive {
                for (k, h_before) in &before {
                    prop_assert!(after[k] <= rho * h_before + 1e-12);
                }
            }
        }
    }
}
