//! [`ConvergenceGate`] – hysteresis comparator over [`FusionQuality`].
//!
//! The gate holds one boolean.  It rises only when the `convergence`
//! predicate holds and falls only when the `divergence` predicate holds;
//! anything in between leaves it where it is, so a quality oscillating
//! around a single threshold cannot make it flap.
//!
//! # Example
//!
//! ```rust
//! use posefuse_filter::gate::ConvergenceGate;
//! use posefuse_types::FusionQuality;
//!
//! let mut gate = ConvergenceGate::new(|q| q.age > 0.2, |q| q.age < 0.1);
//! let q = |age| FusionQuality { age, location: 0.0, direction: 0.0 };
//!
//! assert!(!gate.update(&q(0.15)));
//! assert!(gate.update(&q(0.3)));
//! assert!(gate.update(&q(0.15))); // between thresholds: stays converged
//! assert!(!gate.update(&q(0.05)));
//! ```

use posefuse_types::FusionQuality;

use crate::config::GateThresholds;

/// A quality predicate.
pub type Predicate = Box<dyn Fn(&FusionQuality) -> bool + Send + Sync>;

pub struct ConvergenceGate {
    convergence: Predicate,
    divergence: Predicate,
    state: bool,
}

impl ConvergenceGate {
    /// Gate starting in the non-converged state.
    pub fn new<C, D>(convergence: C, divergence: D) -> Self
    where
        C: Fn(&FusionQuality) -> bool + Send + Sync + 'static,
        D: Fn(&FusionQuality) -> bool + Send + Sync + 'static,
    {
        Self {
            convergence: Box::new(convergence),
            divergence: Box::new(divergence),
            state: false,
        }
    }

    /// Gate driven by threshold comparisons.
    pub fn from_thresholds(thresholds: GateThresholds) -> Self {
        Self::new(
            move |q| thresholds.converges(q),
            move |q| thresholds.diverges(q),
        )
    }

    /// Feed one quality sample and return the resulting state.
    pub fn update(&mut self, quality: &FusionQuality) -> bool {
        if !self.state && (self.convergence)(quality) {
            self.state = true;
        } else if self.state && (self.divergence)(quality) {
            self.state = false;
        }
        self.state
    }

    pub fn is_converged(&self) -> bool {
        self.state
    }
}

impl std::fmt::Debug for ConvergenceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceGate")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(age: f64, direction: f64) -> FusionQuality {
        FusionQuality {
            age,
            location: 0.5,
            direction,
        }
    }

    #[test]
    fn starts_not_converged() {
        let gate = ConvergenceGate::from_thresholds(GateThresholds::default());
        assert!(!gate.is_converged());
    }

    #[test]
    fn rises_only_when_convergence_holds() {
        let mut gate = ConvergenceGate::from_thresholds(GateThresholds::default());
        assert!(!gate.update(&q(0.5, 0.5)));
        assert!(!gate.update(&q(0.15, 0.99)));
        assert!(gate.update(&q(0.25, 0.95)));
    }

    #[test]
    fn stays_converged_between_thresholds() {
        let mut gate = ConvergenceGate::from_thresholds(GateThresholds::default());
        assert!(gate.update(&q(0.3, 0.95)));
        // Neither predicate holds for any of these.
        for quality in [q(0.15, 0.1), q(0.12, 0.95), q(0.19, 0.0), q(0.1, 0.5)] {
            assert!(gate.update(&quality), "flapped on {quality:?}");
        }
        assert!(gate.is_converged());
    }

    #[test]
    fn stays_diverged_between_thresholds() {
        let mut gate = ConvergenceGate::from_thresholds(GateThresholds::default());
        for quality in [q(0.15, 0.95), q(0.19, 0.99), q(0.3, 0.5)] {
            assert!(!gate.update(&quality));
        }
    }

    #[test]
    fn falls_when_divergence_holds() {
        let mut gate = ConvergenceGate::from_thresholds(GateThresholds::default());
        assert!(gate.update(&q(0.3, 0.95)));
        assert!(!gate.update(&q(0.05, 0.95)));
        assert!(!gate.is_converged());
    }

    #[test]
    fn injected_predicates_are_used() {
        let mut gate = ConvergenceGate::new(|q| q.location > 0.9, |q| q.location < 0.1);
        assert!(gate.update(&FusionQuality {
            age: -1.0,
            location: 0.95,
            direction: 0.0,
        }));
    }
}
