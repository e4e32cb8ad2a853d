//! The immutable configuration bundle for one run.

use anyhow::{Context, Result};
use penin_attest::ServiceType;
use penin_guard::GuardThresholds;
use penin_math::KernelParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Canary stage limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryConfig {
    /// Fraction of live traffic the canary carries
    pub fraction: f64,
    /// Sample-count floor before a canary verdict is meaningful
    pub min_samples: u64,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            fraction: 0.05,
            min_samples: 100,
        }
    }
}

/// Caller-facing deadlines, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub ledger_append_ms: u64,
    pub chain_verify_ms: u64,
    pub guard_eval_ms: u64,
    pub promote_pipeline_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ledger_append_ms: 5_000,
            chain_verify_ms: 500,
            guard_eval_ms: 2_000,
            promote_pipeline_ms: 60_000,
        }
    }
}

/// Retry policy for transient ledger I/O
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 50,
        }
    }
}

/// Everything one run of the decision core is configured with
///
/// Constructed once at startup, validated, then never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdcConfig {
    pub ledger_path: PathBuf,
    /// Wire name for new ledgers; always "blake2b-256" unless reading legacy
    pub hash_algorithm: String,
    pub kernel: KernelParams,
    pub guard: GuardThresholds,
    /// Validators a chain must contain to be complete
    pub required_validators: Vec<ServiceType>,
    pub canary: CanaryConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
}

impl Default for PdcConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("penin_worm.jsonl"),
            hash_algorithm: "blake2b-256".to_string(),
            kernel: KernelParams::default(),
            guard: GuardThresholds::default(),
            required_validators: vec![ServiceType::SrOmega, ServiceType::SigmaGuard],
            canary: CanaryConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl PdcConfig {
    /// Parse a TOML fragment over the defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PdcConfig = toml::from_str(text).context("parsing PDC config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations the core cannot run fail-closed with
    pub fn validate(&self) -> Result<()> {
        penin_enc::HashAlgorithm::from_name(&self.hash_algorithm)
            .map_err(|e| anyhow::anyhow!("hash_algorithm: {e}"))?;
        self.guard
            .validate()
            .map_err(|e| anyhow::anyhow!("guard thresholds: {e}"))?;
        if !(0.0..=1.0).contains(&self.canary.fraction) {
            anyhow::bail!("canary.fraction must be in [0,1], got {}", self.canary.fraction);
        }
        for service in [ServiceType::SrOmega, ServiceType::SigmaGuard] {
            if !self.required_validators.contains(&service) {
                anyhow::bail!("required_validators must include {service}");
            }
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PdcConfig::default().validate().unwrap();
    }

    #[test]
    fn toml_fragment_overrides_defaults() {
        let config = PdcConfig::from_toml_str(
            r#"
            ledger_path = "/var/lib/penin/worm.jsonl"

            [guard]
            rho = 0.9
            ece_max = 0.01
            rho_bias_max = 1.05
            sr_min = 0.8
            coherence_min = 0.85
            beta_min = 0.02
            cost_increase_max = 0.1
            kappa_min = 20.0

            [canary]
            fraction = 0.1
            min_samples = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger_path, PathBuf::from("/var/lib/penin/worm.jsonl"));
        assert_eq!(config.guard.beta_min, 0.02);
        assert_eq!(config.canary.min_samples, 500);
        // Untouched sections keep their defaults.
        assert_eq!(config.timeouts.ledger_append_ms, 5_000);
    }

    #[test]
    fn missing_required_validator_rejected() {
        let mut config = PdcConfig::default();
        config.required_validators = vec![ServiceType::SrOmega];
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_canary_fraction_rejected() {
        let mut config = PdcConfig::default();
        config.canary.fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
