//! Mathematical foundation for the PENIN-Omega decision core
//!
//! Pure, deterministic, side-effect-free numeric functions: the harmonic
//! aggregator, the L-infinity meta-score, the CAOS+ modulator, the SR-Omega
//! reflective score and the risk contractivity check. The kernel owns the
//! `MetricSnapshot` bundle because the snapshot is exactly the value set
//! these functions consume.

use thiserror::Error;

mod kernel;
mod snapshot;

pub use kernel::{
    alpha_eff, caos_plus, caos_plus_smoothed, harmonic_mean, linf_score, sr_omega,
    verify_contractive, CaosConfig, CaosState, ContractivityReport, KernelParams, ScoreBundle,
    DEFAULT_CAOS_MAX, DEFAULT_CAOS_MIN, DEFAULT_EPS, DEFAULT_GAMMA, DEFAULT_KAPPA,
    DEFAULT_LAMBDA_C, EPS_ETHICS, WEIGHT_TOLERANCE,
};
pub use snapshot::{CaosComponents, MetricSnapshot, SrComponents};

/// Math kernel errors
///
/// Every variant is an invalid-input condition; the kernel never fails for
/// any other reason and never mutates state.
#[derive(Debug, Error)]
pub enum MathError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Weights must sum to 1.0 within {tolerance}, got {sum}")]
    WeightSum { sum: f64, tolerance: f64 },
}

pub(crate) fn check_finite(name: &str, value: f64) -> Result<f64, MathError> {
    if value.is_nan() || value.is_infinite() {
        return Err(MathError::InvalidInput(format!(
            "{name} must be finite, got {value}"
        )));
    }
    // -0.0 is normalized so canonical serializations and comparisons agree.
    Ok(if value == 0.0 { 0.0 } else { value })
}

pub(crate) fn check_unit(name: &str, value: f64) -> Result<f64, MathError> {
    let value = check_finite(name, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(MathError::InvalidInput(format!(
            "{name} must be in [0,1], got {value}"
        )));
    }
    Ok(value)
}

pub(crate) fn check_nonnegative(name: &str, value: f64) -> Result<f64, MathError> {
    let value = check_finite(name, value)?;
    if value < 0.0 {
        return Err(MathError::InvalidInput(format!(
            "{name} must be nonnegative, got {value}"
        )));
    }
    Ok(value)
}
