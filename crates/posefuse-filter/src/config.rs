//! [`FilterConfig`] – tunable parameters of the particle filter.
//!
//! Every field has a serde default so that a partial TOML table is enough:
//!
//! ```rust
//! use posefuse_filter::config::FilterConfig;
//!
//! let cfg: FilterConfig = serde_json::from_str(r#"{ "max_inconsistency": 0.1 }"#).unwrap();
//! assert_eq!(cfg.count, 128);
//! assert!((cfg.max_inconsistency - 0.1).abs() < 1e-12);
//! assert!((cfg.locator_weight() - 64.0).abs() < 1e-12);
//! assert!(cfg.validate().is_ok());
//! ```

use std::f64::consts::PI;

use posefuse_types::{FusionError, FusionQuality, Point2D};
use serde::{Deserialize, Serialize};

/// Thresholds of the default convergence / divergence predicates.
///
/// The gate converges when `age > converge_age && direction > converge_direction`
/// and diverges when `age < diverge_age`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    pub converge_age: f64,
    pub converge_direction: f64,
    pub diverge_age: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            converge_age: 0.2,
            converge_direction: 0.9,
            diverge_age: 0.1,
        }
    }
}

impl GateThresholds {
    pub fn converges(&self, q: &FusionQuality) -> bool {
        q.age > self.converge_age && q.direction > self.converge_direction
    }

    pub fn diverges(&self, q: &FusionQuality) -> bool {
        q.age < self.diverge_age
    }
}

/// Parameters of a [`ParticleFilter`][crate::filter::ParticleFilter].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Number of heading hypotheses.  Fixed for the lifetime of the filter.
    pub count: usize,
    /// Beacon mount point in the robot frame (metres).
    pub locator_on_robot: Point2D,
    /// How many particles one beacon fix is worth.  `None` means
    /// `0.5 * count`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator_weight: Option<f64>,
    /// Widest master bracket accepted for interpolation (ms).
    pub max_interval_ms: i64,
    /// Largest tolerated disagreement between beacon and odometry
    /// displacement, and the particle acceptance radius (metres).
    pub max_inconsistency: f64,
    /// Upper bound of a particle's age.
    pub max_age: u32,
    /// Standard deviation of the per-particle distance weighting and of the
    /// heading resampling.
    pub sigma: f64,
    /// Odometry travel after which an old anchor carries no trust (metres).
    pub odometry_reliable_range: f64,
    /// Disagreement after which a new anchor carries no trust (metres).
    pub filter_reliable_range: f64,
    /// How far back the matcher keeps samples of each stream (ms).
    pub match_horizon_ms: i64,
    /// Seed for resampling.  `None` draws one from the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub gate: GateThresholds,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            count: 128,
            locator_on_robot: Point2D::zero(),
            locator_weight: None,
            max_interval_ms: 500,
            max_inconsistency: 0.2,
            max_age: 50,
            sigma: 0.1 * PI,
            odometry_reliable_range: 1.0,
            filter_reliable_range: 0.2,
            match_horizon_ms: 5_000,
            seed: None,
            gate: GateThresholds::default(),
        }
    }
}

impl FilterConfig {
    /// Effective beacon weight.
    pub fn locator_weight(&self) -> f64 {
        self.locator_weight.unwrap_or(0.5 * self.count as f64)
    }

    /// Reject parameter sets the filter cannot run with.
    pub fn validate(&self) -> Result<(), FusionError> {
        let fail = |msg: &str| Err(FusionError::InvalidConfig(msg.to_string()));
        if self.count < 2 {
            return fail("count must be at least 2");
        }
        if !(self.locator_weight() >= 0.0) {
            return fail("locator_weight must be non-negative");
        }
        if self.max_interval_ms <= 0 {
            return fail("max_interval_ms must be positive");
        }
        if !(self.max_inconsistency > 0.0) {
            return fail("max_inconsistency must be positive");
        }
        if self.max_age == 0 {
            return fail("max_age must be positive");
        }
        if !(self.sigma > 0.0) || !self.sigma.is_finite() {
            return fail("sigma must be positive and finite");
        }
        if !(self.odometry_reliable_range > 0.0) || !(self.filter_reliable_range > 0.0) {
            return fail("reliable ranges must be positive");
        }
        if self.match_horizon_ms < self.max_interval_ms {
            return fail("match_horizon_ms must not be shorter than max_interval_ms");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = FilterConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_age, 50);
        assert!((cfg.locator_weight() - 64.0).abs() < 1e-12);
    }

    #[test]
    fn explicit_locator_weight_wins() {
        let cfg = FilterConfig {
            locator_weight: Some(3.0),
            ..Default::default()
        };
        assert!((cfg.locator_weight() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_single_particle() {
        let cfg = FilterConfig {
            count: 1,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(FusionError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_non_positive_sigma_and_inconsistency() {
        let bad_sigma = FilterConfig {
            sigma: 0.0,
            ..Default::default()
        };
        assert!(bad_sigma.validate().is_err());

        let bad_inconsistency = FilterConfig {
            max_inconsistency: f64::NAN,
            ..Default::default()
        };
        assert!(bad_inconsistency.validate().is_err());
    }

    #[test]
    fn rejects_negative_locator_weight() {
        let cfg = FilterConfig {
            locator_weight: Some(-1.0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_gate_thresholds() {
        let gate = GateThresholds::default();
        let good = FusionQuality {
            age: 0.3,
            location: 0.0,
            direction: 0.95,
        };
        let poor = FusionQuality {
            age: 0.05,
            location: 1.0,
            direction: 1.0,
        };
        assert!(gate.converges(&good));
        assert!(!gate.diverges(&good));
        assert!(!gate.converges(&poor));
        assert!(gate.diverges(&poor));
    }
}
