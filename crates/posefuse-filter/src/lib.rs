//! `posefuse-filter` – odometry/beacon pose fusion.
//!
//! Combines a high-rate, drifting odometry pose stream with a sparse absolute
//! beacon fix stream into one corrected pose that can be queried at odometry
//! rate, plus a sticky "converged" signal for downstream control.
//!
//! Everything here is synchronous and free of I/O.
//!
//! # Modules
//!
//! - [`filter`] – [`ParticleFilter`]: the aggregate exposing
//!   `measure_master`, `measure_helper`, `get_or_set`, `quality` and
//!   `is_convergent`.
//! - [`matcher`] – [`BracketMatcher`][matcher::BracketMatcher]: pairs each
//!   beacon fix with the two odometry samples around it.
//! - [`interpolate`] – weighted pose blending and time interpolation.
//! - [`particle`] – [`ParticlePopulation`][particle::ParticlePopulation]:
//!   heading hypotheses with integer ages.
//! - [`quality`] – reduction of the population to a
//!   [`FusionQuality`][posefuse_types::FusionQuality].
//! - [`gate`] – [`ConvergenceGate`]: hysteresis over the quality.
//! - [`extrapolator`] – [`ExtrapolationAnchor`]: odometry-rate pose
//!   projection between fixes.
//! - [`gauss`] – [`Gaussian`][gauss::Gaussian] weighting and sampling.
//! - [`config`] – [`FilterConfig`] and [`GateThresholds`].

pub mod config;
pub mod extrapolator;
pub mod filter;
pub mod gate;
pub mod gauss;
pub mod interpolate;
pub mod matcher;
pub mod particle;
pub mod quality;

pub use config::{FilterConfig, GateThresholds};
pub use extrapolator::ExtrapolationAnchor;
pub use filter::{ParticleFilter, StepFeedbackHook};
pub use gate::ConvergenceGate;
